//! LLM provider adapter (spec §6).
//!
//! A `LlmProvider` is a handle for one model tier exposing
//! `response(messages) -> (message, usage)`. Concrete vendor integrations are
//! out of core scope (spec §1 Non-goals); [`StaticLlmProvider`] is the test
//! double used throughout the unit and integration tests, and
//! [`HttpLlmProvider`] is a minimal, vendor-agnostic JSON adapter showing the
//! shape a production client would take.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{exponential::ExponentialBackoff, future::retry, SystemClock};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FactoryError, Result};

/// Attempts a provider call allows before giving up (spec §7 "Provider
/// error": exponential backoff + jitter, 3 attempts by default).
const MAX_PROVIDER_ATTEMPTS: u32 = 3;

/// Coarse model tiers the rest of the engine reasons about; concrete model
/// identifiers are resolved via [`crate::config::EngineConfig::model_for_tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Highest,
    Middle,
    Small,
    Xs,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelTier::Highest => "highest",
            ModelTier::Middle => "middle",
            ModelTier::Small => "small",
            ModelTier::Xs => "xs",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl LlmUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub message: LlmMessage,
    pub usage: LlmUsage,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The opaque model identifier this handle serves.
    fn model_id(&self) -> &str;

    async fn response(&self, messages: &[LlmMessage]) -> Result<LlmResponse>;
}

/// A registry mapping each model tier to a concrete provider handle,
/// replacing the teacher/original's module-level singleton LLM instances
/// (spec §9, "Global model handles") with an injected dependency.
pub struct ModelRegistry {
    handles: HashMap<ModelTier, Box<dyn LlmProvider>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }

    pub fn register(&mut self, tier: ModelTier, provider: Box<dyn LlmProvider>) {
        self.handles.insert(tier, provider);
    }

    pub fn get(&self, tier: ModelTier) -> Result<&dyn LlmProvider> {
        self.handles
            .get(&tier)
            .map(|b| b.as_ref())
            .ok_or_else(|| FactoryError::Config(format!("no provider registered for tier {tier}")))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A deterministic test double: returns a fixed or queued response per call,
/// and counts invocations so tests can assert on call volume.
pub struct StaticLlmProvider {
    model_id: String,
    responses: Mutex<Vec<String>>,
    default_response: String,
    calls: AtomicUsize,
}

impl StaticLlmProvider {
    pub fn new(model_id: impl Into<String>, default_response: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            responses: Mutex::new(Vec::new()),
            default_response: default_response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue responses to be returned in order before falling back to the
    /// default response.
    pub fn with_queue(mut self, responses: Vec<String>) -> Self {
        self.responses = Mutex::new(responses);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for StaticLlmProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn response(&self, messages: &[LlmMessage]) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = {
            let mut queue = self.responses.lock().unwrap();
            if queue.is_empty() {
                self.default_response.clone()
            } else {
                queue.remove(0)
            }
        };
        let prompt_tokens = messages.iter().map(|m| m.content.len() as u64 / 4).sum();
        let completion_tokens = content.len() as u64 / 4;
        Ok(LlmResponse {
            message: LlmMessage {
                role: "assistant".to_string(),
                content,
            },
            usage: LlmUsage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}

/// A minimal JSON-over-HTTP provider adapter. The wire format is
/// intentionally generic (`{"messages": [...]}` in, `{"content", "usage"}`
/// out) since no specific vendor API is in scope.
pub struct HttpLlmProvider {
    model_id: String,
    endpoint: url::Url,
    client: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(model_id: impl Into<String>, endpoint: url::Url) -> Self {
        Self {
            model_id: model_id.into(),
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct HttpLlmRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
}

#[derive(Deserialize)]
struct HttpLlmResponseBody {
    content: String,
    #[serde(default)]
    usage: LlmUsage,
}

impl HttpLlmProvider {
    async fn call_once(&self, messages: &[LlmMessage]) -> Result<LlmResponse> {
        let body = HttpLlmRequest {
            model: &self.model_id,
            messages,
        };
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| FactoryError::Provider(e.to_string()))?
            .error_for_status()
            .map_err(|e| FactoryError::Provider(e.to_string()))?;
        let parsed: HttpLlmResponseBody = resp
            .json()
            .await
            .map_err(|e| FactoryError::Provider(e.to_string()))?;
        Ok(LlmResponse {
            message: LlmMessage {
                role: "assistant".to_string(),
                content: parsed.content,
            },
            usage: parsed.usage,
        })
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Retries a failed call with exponential backoff + jitter, up to
    /// [`MAX_PROVIDER_ATTEMPTS`] total attempts, before surfacing the error.
    async fn response(&self, messages: &[LlmMessage]) -> Result<LlmResponse> {
        let attempts = AtomicU32::new(0);
        let backoff = ExponentialBackoff::<SystemClock> {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            ..Default::default()
        };

        retry(backoff, || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.call_once(messages).await {
                Ok(response) => Ok(response),
                Err(e) if attempt >= MAX_PROVIDER_ATTEMPTS => Err(backoff::Error::permanent(e)),
                Err(e) => {
                    warn!(attempt, model_id = %self.model_id, error = %e, "llm provider call failed, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
        .map_err(|e| match e {
            backoff::Error::Permanent(inner) => inner,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_default_then_queue() {
        let provider =
            StaticLlmProvider::new("m", "default").with_queue(vec!["first".into(), "second".into()]);
        let r1 = provider.response(&[LlmMessage::user("hi")]).await.unwrap();
        assert_eq!(r1.message.content, "first");
        let r2 = provider.response(&[]).await.unwrap();
        assert_eq!(r2.message.content, "second");
        let r3 = provider.response(&[]).await.unwrap();
        assert_eq!(r3.message.content, "default");
        assert_eq!(provider.call_count(), 3);
    }

    #[test]
    fn registry_missing_tier_errors() {
        let registry = ModelRegistry::new();
        assert!(registry.get(ModelTier::Highest).is_err());
    }

    #[test]
    fn registry_resolves_registered_tier() {
        let mut registry = ModelRegistry::new();
        registry.register(
            ModelTier::Middle,
            Box::new(StaticLlmProvider::new("m", "ok")),
        );
        assert_eq!(registry.get(ModelTier::Middle).unwrap().model_id(), "m");
    }

    #[tokio::test]
    async fn http_provider_retries_transient_failures_then_succeeds() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "recovered",
                "usage": {"prompt_tokens": 1, "completion_tokens": 1}
            })))
            .mount(&server)
            .await;

        let provider = HttpLlmProvider::new("m", url::Url::parse(&server.uri()).unwrap());
        let response = provider.response(&[LlmMessage::user("hi")]).await.unwrap();
        assert_eq!(response.message.content, "recovered");
    }

    #[tokio::test]
    async fn http_provider_gives_up_after_max_attempts() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let provider = HttpLlmProvider::new("m", url::Url::parse(&server.uri()).unwrap());
        let err = provider.response(&[LlmMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, FactoryError::Provider(_)));
    }
}

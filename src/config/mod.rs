//! Engine configuration.
//!
//! Loaded via `figment` from an optional TOML file overlaid with `EVO_`-
//! prefixed environment variables, following the layering style of
//! `llm-cost-ops::config`.

use std::collections::HashMap;
use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::MetricsConfig;
use crate::providers::llm::ModelTier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub budget: BudgetConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutConfig,
    pub models: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Overall session cost ceiling; `None` means unlimited.
    #[serde(default)]
    pub session_budget: Option<f64>,
    #[serde(default = "default_auto_approve_threshold")]
    pub auto_approve_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_phase_timeout_secs")]
    pub phase_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maps a model tier to a concrete model identifier.
    pub tiers: HashMap<ModelTier, String>,
    /// Price per 1000 tokens, keyed by model identifier.
    pub price_table: HashMap<String, f64>,
    #[serde(default = "default_price")]
    pub default_price_per_1k: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_auto_approve_threshold() -> f64 {
    0.001
}

fn default_worker_pool_size() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    cpus.clamp(2, 16)
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_phase_timeout_secs() -> u64 {
    600
}

fn default_price() -> f64 {
    0.002
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: EngineConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EVO_").split("__"))
            .extract()
            .map_err(|e| crate::error::FactoryError::config(e.to_string()))?;
        Ok(config)
    }

    /// A self-contained default configuration suitable for tests and the
    /// CLI's zero-config mode.
    pub fn default_local() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(ModelTier::Highest, "model-highest".to_string());
        tiers.insert(ModelTier::Middle, "model-middle".to_string());
        tiers.insert(ModelTier::Small, "model-small".to_string());
        tiers.insert(ModelTier::Xs, "model-xs".to_string());

        let mut price_table = HashMap::new();
        price_table.insert("model-highest".to_string(), 0.015);
        price_table.insert("model-middle".to_string(), 0.003);
        price_table.insert("model-small".to_string(), 0.0008);
        price_table.insert("model-xs".to_string(), 0.0002);

        Self {
            budget: BudgetConfig {
                session_budget: None,
                auto_approve_threshold: default_auto_approve_threshold(),
            },
            concurrency: ConcurrencyConfig {
                worker_pool_size: default_worker_pool_size(),
            },
            timeouts: TimeoutConfig {
                call_timeout_secs: default_call_timeout_secs(),
                phase_timeout_secs: default_phase_timeout_secs(),
            },
            models: ModelConfig {
                tiers,
                price_table,
                default_price_per_1k: default_price(),
            },
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn model_for_tier(&self, tier: ModelTier) -> String {
        self.models
            .tiers
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| format!("model-{tier:?}").to_lowercase())
    }

    pub fn price_for_model(&self, model_id: &str) -> f64 {
        self.models
            .price_table
            .get(model_id)
            .copied()
            .unwrap_or(self.models.default_price_per_1k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_local_has_all_tiers() {
        let config = EngineConfig::default_local();
        assert_eq!(config.model_for_tier(ModelTier::Highest), "model-highest");
        assert_eq!(config.model_for_tier(ModelTier::Xs), "model-xs");
    }

    #[test]
    fn unknown_model_falls_back_to_default_price() {
        let config = EngineConfig::default_local();
        assert_eq!(config.price_for_model("unknown-model"), 0.002);
    }

    #[test]
    fn worker_pool_size_is_clamped() {
        let config = EngineConfig::default_local();
        assert!(config.concurrency.worker_pool_size >= 2);
        assert!(config.concurrency.worker_pool_size <= 16);
    }
}

//! C12 — Quality Validator.
//!
//! Delegates to collaborators spec.md §4.12 treats as out-of-core (a real
//! linter, a real type checker): this implementation runs C5's syntax hook
//! per file, reads back lint findings from the vector store's `code_context`
//! table (a stand-in for a static-analysis collaborator), and optionally
//! runs a bounded LLM code review.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::providers::llm::{LlmMessage, ModelRegistry, ModelTier};
use crate::providers::vector_store::VectorStore;
use crate::validation::{syntax_hook, ValidationHookRegistry, ValidationInput};

const MAX_REVIEW_FILES: usize = 5;
const MAX_REVIEW_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub passed: bool,
    pub issues: Vec<String>,
    pub gate_results: HashMap<String, bool>,
    pub summary: HashMap<String, Value>,
}

pub struct QualityValidator {
    store: Arc<dyn VectorStore>,
    review_model: Option<(Arc<ModelRegistry>, ModelTier)>,
}

fn language_for(path: &str) -> &'static str {
    if path.ends_with(".py") {
        "python"
    } else if path.ends_with(".rs") {
        "rust"
    } else {
        "text"
    }
}

impl QualityValidator {
    pub fn new(store: Arc<dyn VectorStore>, review_model: Option<(Arc<ModelRegistry>, ModelTier)>) -> Self {
        Self { store, review_model }
    }

    async fn lint_issues(&self, path: &str) -> Vec<String> {
        match self.store.get_code_context(path).await {
            Ok(records) => records
                .into_iter()
                .flat_map(|r| r.lint_errors.into_iter().map(move |e| format!("{path}: {e}")))
                .collect(),
            Err(e) => {
                warn!(path, error = %e, "lint lookup failed");
                Vec::new()
            }
        }
    }

    async fn code_review(&self, modified_files: &HashMap<String, String>, objective: &str, analysis_summary: &str) -> Vec<String> {
        let Some((registry, tier)) = &self.review_model else {
            return Vec::new();
        };
        let Ok(provider) = registry.get(*tier) else {
            return Vec::new();
        };

        let snippets: Vec<String> = modified_files
            .iter()
            .take(MAX_REVIEW_FILES)
            .map(|(path, content)| {
                let bounded: String = content.chars().take(MAX_REVIEW_CHARS).collect();
                format!("--- {path} ---\n{bounded}")
            })
            .collect();

        let prompt = format!(
            "Objective: {objective}\nAnalysis summary: {analysis_summary}\n\nReview the following changes. \
             Reply with the single word OK if there are no issues, otherwise list one issue per line.\n\n{}",
            snippets.join("\n\n")
        );

        match provider.response(&[LlmMessage::user(prompt)]).await {
            Ok(response) => {
                let text = response.message.content.trim().to_string();
                if text.eq_ignore_ascii_case("ok") {
                    Vec::new()
                } else {
                    text.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
                }
            }
            Err(e) => {
                warn!(error = %e, "code review call failed");
                Vec::new()
            }
        }
    }

    pub async fn validate(
        &self,
        modified_files: &HashMap<String, String>,
        objective: &str,
        analysis_summary: &str,
    ) -> QualityReport {
        let mut issues = Vec::new();
        let mut gate_results = HashMap::new();

        for (path, content) in modified_files {
            let mut hooks = ValidationHookRegistry::new();
            hooks.register(syntax_hook("syntax", 10, language_for(path)));
            let results = hooks.run_validation_hooks(&ValidationInput::Text(content), Some(&["syntax"]));
            let passed = crate::validation::all_pass(&results);
            gate_results.insert(format!("syntax:{path}"), passed);
            if !passed {
                for outcome in results.values().filter(|r| !r.outcome) {
                    issues.push(format!("{path}: {}", outcome.feedback));
                }
            }

            issues.extend(self.lint_issues(path).await);
        }

        issues.extend(self.code_review(modified_files, objective, analysis_summary).await);

        let passed = issues.is_empty();
        let mut summary = HashMap::new();
        summary.insert("files_checked".to_string(), Value::from(modified_files.len()));
        summary.insert("issue_count".to_string(), Value::from(issues.len()));

        QualityReport {
            passed,
            issues,
            gate_results,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::vector_store::{CodeContextRecord, InMemoryVectorStore};

    #[tokio::test]
    async fn valid_code_with_no_lint_errors_passes() {
        let store = Arc::new(InMemoryVectorStore::new());
        let validator = QualityValidator::new(store, None);
        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "def f(x):\n    return x\n".to_string());
        let report = validator.validate(&files, "objective", "summary").await;
        assert!(report.passed);
    }

    #[tokio::test]
    async fn syntax_failure_is_reported_as_issue() {
        let store = Arc::new(InMemoryVectorStore::new());
        let validator = QualityValidator::new(store, None);
        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "def f(x)\n    return x\n".to_string());
        let report = validator.validate(&files, "objective", "summary").await;
        assert!(!report.passed);
        assert!(report.issues.iter().any(|i| i.contains("missing colon")));
    }

    #[tokio::test]
    async fn lint_errors_from_store_are_aggregated() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert_code_context(CodeContextRecord {
                path: "a.py".to_string(),
                chunk_name: "f".to_string(),
                chunk_type: "function".to_string(),
                content: "def f(x):\n    return x\n".to_string(),
                vector: vec![],
                start_line: 1,
                end_line: 2,
                content_hash: "h".to_string(),
                language: "python".to_string(),
                lint_errors: vec!["unused import os".to_string()],
                dependencies: vec![],
            })
            .await
            .unwrap();

        let validator = QualityValidator::new(store, None);
        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "def f(x):\n    return x\n".to_string());
        let report = validator.validate(&files, "objective", "summary").await;
        assert!(!report.passed);
        assert!(report.issues.iter().any(|i| i.contains("unused import os")));
    }
}

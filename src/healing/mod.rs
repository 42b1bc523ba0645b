//! C14 — Self-Healing Controller.
//!
//! Classifies consolidated quality/operational issues by keyword, picks a
//! recovery strategy, and dispatches it (spec §4.14). Grounded directly in
//! `code_orchestration_agent.py::_analyze_failure_patterns` /
//! `_execute_self_healing`; the bounded "exactly one healing round" behavior
//! is grounded in `workflow/self_healing_controller.py::SelfHealingController`'s
//! `recovery_attempted` flag. The caller (C15) is responsible for enforcing
//! that bound — this module only ever runs one strategy per call.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::agents::knowledge::KnowledgeRetriever;
use crate::architecture::ArchitecturalContext;
use crate::error::Result;
use crate::execution::sanitize;
use crate::metrics;
use crate::planning::{Plan, PlanGenerator};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureAnalysis {
    pub strategy: String,
    pub confidence: f64,
    pub auto_recoverable: bool,
    pub issues: Vec<String>,
    pub patterns_detected: Vec<String>,
}

struct StrategyRule {
    name: &'static str,
    tokens: &'static [&'static str],
    auto_recoverable: bool,
    confidence: f64,
}

const STRATEGIES: &[StrategyRule] = &[
    StrategyRule {
        name: "auto_fix_syntax",
        tokens: &["syntax error", "indentation", "missing import", "undefined name"],
        auto_recoverable: true,
        confidence: 0.9,
    },
    StrategyRule {
        name: "fix_test_logic",
        tokens: &["test failed", "assertion", "expected", "actual"],
        auto_recoverable: true,
        confidence: 0.7,
    },
    StrategyRule {
        name: "replan_performance",
        tokens: &["performance", "timeout", "memory", "optimization"],
        auto_recoverable: false,
        confidence: 0.6,
    },
    StrategyRule {
        name: "human_escalation",
        tokens: &["security", "vulnerability", "privilege", "injection"],
        auto_recoverable: false,
        confidence: 0.95,
    },
];

/// Keyword matching over the concatenated, lowercased issue strings (spec
/// §4.14's table, checked in the table's own priority order).
pub fn analyze_failure_patterns(issues: &[String]) -> FailureAnalysis {
    if issues.is_empty() {
        return FailureAnalysis {
            strategy: "no_action".to_string(),
            confidence: 1.0,
            auto_recoverable: true,
            issues: Vec::new(),
            patterns_detected: Vec::new(),
        };
    }

    let combined = issues.join(" ").to_lowercase();
    for rule in STRATEGIES {
        let matched: Vec<String> = rule.tokens.iter().filter(|t| combined.contains(**t)).map(|t| t.to_string()).collect();
        if !matched.is_empty() {
            return FailureAnalysis {
                strategy: rule.name.to_string(),
                confidence: rule.confidence,
                auto_recoverable: rule.auto_recoverable,
                issues: issues.to_vec(),
                patterns_detected: matched,
            };
        }
    }

    FailureAnalysis {
        strategy: "generic_retry".to_string(),
        confidence: 0.4,
        auto_recoverable: false,
        issues: issues.to_vec(),
        patterns_detected: Vec::new(),
    }
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

#[derive(Debug, Default)]
pub struct HealingOutcome {
    pub strategy: String,
    pub notes: Vec<String>,
    pub updated_plan: Option<Plan>,
    pub escalated: bool,
}

pub struct SelfHealingController;

impl SelfHealingController {
    pub fn new() -> Self {
        Self
    }

    /// Dispatches exactly the strategy named in `analysis`, never more than
    /// one. `modified_files` is rewritten in place for `auto_fix_syntax`;
    /// `updated_plan` is populated when a re-plan strategy runs.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_self_healing(
        &self,
        analysis: &FailureAnalysis,
        modified_files: &mut HashMap<String, String>,
        task: &str,
        project_root: &Path,
        plan_generator: &PlanGenerator,
        architectural_context: Option<&ArchitecturalContext>,
        knowledge: Option<&KnowledgeRetriever>,
    ) -> Result<HealingOutcome> {
        let mut outcome = HealingOutcome {
            strategy: analysis.strategy.clone(),
            ..Default::default()
        };

        match analysis.strategy.as_str() {
            "auto_fix_syntax" => {
                for (path, content) in modified_files.iter_mut() {
                    let language = language_for(path);
                    *content = sanitize::auto_fix(content, language);
                }
                info!(files = modified_files.len(), "applied syntax auto-fix healing");
            }
            "fix_test_logic" => {
                let test_files: Vec<&String> = modified_files.keys().filter(|p| p.contains("test")).collect();
                if test_files.is_empty() {
                    outcome.notes.push("test logic issue flagged but no test file identified".to_string());
                } else {
                    for path in test_files {
                        outcome.notes.push(format!("{path}: flagged for manual test regeneration"));
                    }
                }
            }
            "replan_performance" => {
                let mut context = String::new();
                if let Some(retriever) = knowledge {
                    context = retriever.retrieve_context("performance optimization", 3).await;
                }
                let augmented_task = format!(
                    "{task}\n\nPerformance issues reported: {}\n{}",
                    analysis.issues.join("; "),
                    if context.is_empty() { String::new() } else { format!("Relevant knowledge:\n{context}") }
                );
                let language = modified_files.keys().next().map(|p| language_for(p)).unwrap_or("text");
                let plan = plan_generator.generate(&augmented_task, &context, project_root, language, architectural_context).await?;
                outcome.notes.push("re-planned with performance-focused task augmentation".to_string());
                outcome.updated_plan = Some(plan);
            }
            "generic_retry" => {
                let augmented_task = format!("{task}\n\nPrevious attempt reported issues: {}", analysis.issues.join("; "));
                let language = modified_files.keys().next().map(|p| language_for(p)).unwrap_or("text");
                let plan = plan_generator.generate(&augmented_task, "", project_root, language, architectural_context).await?;
                outcome.notes.push("re-planned after generic retry".to_string());
                outcome.updated_plan = Some(plan);
            }
            "human_escalation" => {
                warn!(issues = ?analysis.issues, "escalating to human review");
                outcome.escalated = true;
                outcome.notes.push(format!("escalated to human review: {}", analysis.issues.join("; ")));
            }
            "no_action" => {}
            other => {
                warn!(strategy = other, "unknown healing strategy, no-op");
            }
        }

        metrics::record_healing_round(&analysis.strategy, !outcome.escalated);
        Ok(outcome)
    }
}

impl Default for SelfHealingController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ReflectiveOperatorBase;
    use crate::budget::{BudgetManager, BudgetScope};
    use crate::config::EngineConfig;
    use crate::providers::filesystem::TokioProjectFilesystem;
    use crate::providers::llm::{ModelRegistry, ModelTier, StaticLlmProvider};
    use crate::trajectory::PhaseCostTracker;
    use crate::validation::ValidationHookRegistry;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn syntax_issue_maps_to_auto_fix_syntax() {
        let analysis = analyze_failure_patterns(&["syntax error: missing colon".to_string()]);
        assert_eq!(analysis.strategy, "auto_fix_syntax");
        assert!(analysis.auto_recoverable);
    }

    #[test]
    fn test_failure_maps_to_fix_test_logic() {
        let analysis = analyze_failure_patterns(&["assertion failed: expected 1 got 2".to_string()]);
        assert_eq!(analysis.strategy, "fix_test_logic");
        assert!(analysis.auto_recoverable);
    }

    #[test]
    fn performance_issue_maps_to_replan_not_auto_recoverable() {
        let analysis = analyze_failure_patterns(&["performance timeout in loop".to_string()]);
        assert_eq!(analysis.strategy, "replan_performance");
        assert!(!analysis.auto_recoverable);
    }

    #[test]
    fn security_issue_maps_to_human_escalation() {
        let analysis = analyze_failure_patterns(&["potential sql injection vulnerability".to_string()]);
        assert_eq!(analysis.strategy, "human_escalation");
        assert!(!analysis.auto_recoverable);
    }

    #[test]
    fn unrecognized_issue_maps_to_generic_retry() {
        let analysis = analyze_failure_patterns(&["something unexpected happened".to_string()]);
        assert_eq!(analysis.strategy, "generic_retry");
        assert!(!analysis.auto_recoverable);
    }

    #[test]
    fn no_issues_means_no_action() {
        let analysis = analyze_failure_patterns(&[]);
        assert_eq!(analysis.strategy, "no_action");
        assert!(analysis.auto_recoverable);
    }

    fn plan_generator(response: &str) -> PlanGenerator {
        let fs = Arc::new(TokioProjectFilesystem::new());
        let mut registry = ModelRegistry::new();
        registry.register(ModelTier::Highest, Box::new(StaticLlmProvider::new("model-highest", response)));

        let budget_manager = Arc::new(BudgetManager::with_always_approve(EngineConfig::default_local()));
        let scope = Arc::new(BudgetScope::new("root", None, ModelTier::Highest, None, None, Arc::clone(&budget_manager)));
        let tracker = Arc::new(PhaseCostTracker::new(Arc::clone(&budget_manager), "op-1", "test"));
        tracker.start_phase("phase-1", "test phase", "model-highest");
        let base = Arc::new(ReflectiveOperatorBase::new(scope, tracker, Arc::new(registry), ValidationHookRegistry::new()));

        PlanGenerator::new(fs, base)
    }

    #[tokio::test]
    async fn auto_fix_syntax_rewrites_files_in_place() {
        let controller = SelfHealingController::new();
        let analysis = analyze_failure_patterns(&["syntax error: missing colon".to_string()]);
        let mut files = HashMap::new();
        files.insert("a.py".to_string(), "def f(x)\n    return x".to_string());
        let dir = tempdir().unwrap();
        let generator = plan_generator("[]");
        let outcome = controller
            .execute_self_healing(&analysis, &mut files, "task", dir.path(), &generator, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.strategy, "auto_fix_syntax");
        assert!(files["a.py"].contains("def f(x):"));
    }

    #[tokio::test]
    async fn fix_test_logic_notes_without_modifying_files() {
        let controller = SelfHealingController::new();
        let analysis = analyze_failure_patterns(&["assertion failed".to_string()]);
        let mut files = HashMap::new();
        files.insert("test_math.py".to_string(), "def test_add():\n    assert add(1, 1) == 3\n".to_string());
        let original = files["test_math.py"].clone();
        let dir = tempdir().unwrap();
        let generator = plan_generator("[]");
        let outcome = controller
            .execute_self_healing(&analysis, &mut files, "task", dir.path(), &generator, None, None)
            .await
            .unwrap();
        assert_eq!(files["test_math.py"], original);
        assert!(!outcome.notes.is_empty());
    }

    #[tokio::test]
    async fn human_escalation_sets_escalated_flag() {
        let controller = SelfHealingController::new();
        let analysis = analyze_failure_patterns(&["sql injection vulnerability".to_string()]);
        let mut files = HashMap::new();
        let dir = tempdir().unwrap();
        let generator = plan_generator("[]");
        let outcome = controller
            .execute_self_healing(&analysis, &mut files, "task", dir.path(), &generator, None, None)
            .await
            .unwrap();
        assert!(outcome.escalated);
    }
}

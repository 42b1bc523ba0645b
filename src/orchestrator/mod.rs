//! C15 — Orchestration Agent.
//!
//! Top-level `execute(objective)` state machine combining C3–C14 (spec
//! §4.15). Phase sequence and the final-decision shape are grounded
//! directly in `code_orchestration_agent.py::execute` — its sections 1-9 map
//! onto the ten steps below.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::knowledge::{knowledge_cache_key, KnowledgeRetriever};
use crate::agents::scoring::{default_patterns_for_step_type, score_pattern_application};
use crate::agents::ReflectiveOperatorBase;
use crate::architecture;
use crate::budget::{BudgetManager, BudgetScope};
use crate::error::Result;
use crate::execution::{commit_outcome, StepExecutor};
use crate::healing::{analyze_failure_patterns, SelfHealingController};
use crate::planning::{Plan, PlanGenerator};
use crate::providers::filesystem::ProjectFilesystem;
use crate::providers::llm::{ModelRegistry, ModelTier};
use crate::session::{ModificationResult, SessionState};
use crate::trajectory::PhaseCostTracker;
use crate::validation::{syntax_hook, OperationalValidator, QualityValidator, ValidationHookRegistry};

#[derive(Debug, Deserialize)]
struct ObjectiveInput {
    task: String,
    project_path: String,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    quality_gates: Vec<String>,
    #[serde(default)]
    original_idea: String,
}

pub struct OrchestrationAgent {
    filesystem: Arc<dyn ProjectFilesystem>,
    budget_manager: Arc<BudgetManager>,
    knowledge: Option<Arc<KnowledgeRetriever>>,
    base: Arc<ReflectiveOperatorBase>,
    plan_generator: PlanGenerator,
    step_executor: StepExecutor,
    quality_validator: QualityValidator,
    operational_validator: OperationalValidator,
    healing_controller: SelfHealingController,
}

impl OrchestrationAgent {
    pub fn new(
        filesystem: Arc<dyn ProjectFilesystem>,
        models: Arc<ModelRegistry>,
        budget_manager: Arc<BudgetManager>,
        quality_validator: QualityValidator,
        knowledge: Option<Arc<KnowledgeRetriever>>,
    ) -> Self {
        // C15 owns the C6 capability bundle (one root budget scope, one phase
        // cost tracker) and hands it to every LLM-driven sub-agent, so a
        // planning or modifier call is gated and recorded the same way
        // regardless of which sub-agent issues it (spec §2, §4.6).
        let scope = Arc::new(BudgetScope::new(
            "orchestration-root",
            None,
            ModelTier::Highest,
            None,
            None,
            Arc::clone(&budget_manager),
        ));
        let tracker = Arc::new(PhaseCostTracker::new(Arc::clone(&budget_manager), Uuid::new_v4().to_string(), "orchestration"));
        let mut hooks = ValidationHookRegistry::new();
        hooks.register(syntax_hook("syntax", 10, "python"));
        let base = Arc::new(ReflectiveOperatorBase::new(scope, tracker, Arc::clone(&models), hooks));

        let plan_generator = PlanGenerator::new(Arc::clone(&filesystem), Arc::clone(&base));
        let step_executor = StepExecutor::new(Arc::clone(&filesystem), Arc::clone(&base), knowledge.clone());
        Self {
            filesystem,
            budget_manager,
            knowledge,
            base,
            plan_generator,
            step_executor,
            quality_validator,
            operational_validator: OperationalValidator::new(),
            healing_controller: SelfHealingController::new(),
        }
    }

    async fn read_manifests(&self, project_root: &Path) -> HashMap<String, String> {
        let mut manifests = HashMap::new();
        for (language, filename) in [("python", "requirements.txt"), ("rust", "Cargo.toml")] {
            if let Ok(Some(content)) = self.filesystem.read_file(project_root, filename).await {
                manifests.insert(language.to_string(), content);
            }
        }
        manifests
    }

    async fn read_all_project_files(&self, project_root: &Path) -> HashMap<String, String> {
        let mut files = HashMap::new();
        if let Ok(paths) = self.filesystem.list_files(project_root).await {
            for path in paths {
                if let Ok(Some(content)) = self.filesystem.read_file(project_root, &path).await {
                    files.insert(path, content);
                }
            }
        }
        files
    }

    fn primary_language(plan: &Plan, files: &HashMap<String, String>) -> &'static str {
        plan.iter()
            .map(|s| s.file.as_str())
            .chain(files.keys().map(|s| s.as_str()))
            .find_map(|p| {
                if p.ends_with(".py") {
                    Some("python")
                } else if p.ends_with(".rs") {
                    Some("rust")
                } else if p.ends_with(".jsx") || p.ends_with(".js") {
                    Some("javascript")
                } else {
                    None
                }
            })
            .unwrap_or("python")
    }

    /// Sanitizes a value for the final result: a JSON round trip strips
    /// anything that wasn't representable as JSON in the first place
    /// (source's `_clean_dict`/`_clean_list`/`_clean_results` strip function
    /// refs and opaque handles by the same mechanism).
    fn sanitize(value: &Value) -> Value {
        serde_json::from_str(&value.to_string()).unwrap_or(Value::Null)
    }

    /// Top-level orchestration exceptions never propagate uncaught (spec
    /// §7, §8): every fallible step below is caught and converted into a
    /// reject decision rather than an `Err`.
    pub async fn execute(&self, objective: Value) -> Result<Value> {
        let input: ObjectiveInput = match serde_json::from_value(objective.clone()) {
            Ok(input) => input,
            Err(e) => {
                return Ok(Self::sanitize(&serde_json::json!({
                    "decision": "reject",
                    "reason": format!("Missing required fields: {e}"),
                })));
            }
        };
        if input.task.trim().is_empty() || input.project_path.trim().is_empty() {
            return Ok(Self::sanitize(&serde_json::json!({
                "decision": "reject",
                "reason": "Missing required fields: 'task' and 'project_path' must be non-empty",
            })));
        }

        let project_root = PathBuf::from(&input.project_path);
        let mut session = SessionState::new(objective, input.project_path.clone(), input.task.clone(), input.constraints.clone(), input.quality_gates.clone());
        if !input.original_idea.is_empty() {
            let _ = session.set_extra("original_idea", Value::String(input.original_idea.clone()));
        }

        // Step 3: analyze architectural context (C9).
        let combined_text = format!("{} {}", input.task, input.original_idea);
        let arch_ctx = architecture::analyze(&combined_text, &input.original_idea, &input.constraints);
        session.system_type = Some(arch_ctx.system_type);
        session.analysis = Some(Self::sanitize(&serde_json::to_value(&arch_ctx).unwrap_or(Value::Null)));
        session.architectural_context = Some(arch_ctx.clone());
        session.record_step("Project Context Analysis", format!("detected system_type={}", arch_ctx.system_type), Some(true), Utc::now());

        // Step 4: retrieve knowledge context (C7), cache-backed.
        let cache_key = knowledge_cache_key(&input.task, &arch_ctx.system_type.to_string(), &arch_ctx.architecture_pattern);
        let retrieved_context = if let Some(cached) = session.knowledge_cache.get(&cache_key) {
            cached.clone()
        } else if let Some(retriever) = &self.knowledge {
            let context = retriever.retrieve_context(&input.task, 5).await;
            session.knowledge_cache.insert(cache_key, context.clone());
            context
        } else {
            String::new()
        };
        session.retrieved_context = retrieved_context.clone();
        let knowledge_applied = !retrieved_context.is_empty();

        // Budget gate before the costly planning phase (spec §4.2's
        // top-level approval gate, exercised here at phase granularity).
        let plan_model_id = self.budget_manager.config().model_for_tier(ModelTier::Highest);
        let exec_model_id = self.budget_manager.config().model_for_tier(ModelTier::Middle);
        if !self.budget_manager.request_approval("Modification Planning", &input.task, &plan_model_id).await {
            session.record_step("Modification Planning", "budget denied before planning", Some(false), Utc::now());
            return Ok(Self::sanitize(&self.build_result(&session, "reject", "budget denied: insufficient session budget for planning", knowledge_applied, None, "")));
        }

        // Step 5: plan (C10), gated and recorded through the shared C6 base.
        let language = {
            let files = self.read_all_project_files(&project_root).await;
            Self::primary_language(&Vec::new(), &files)
        };
        self.base.tracker().start_phase("planning", "Modification Planning", &plan_model_id);
        let mut plan = match self
            .plan_generator
            .generate(&input.task, &retrieved_context, &project_root, language, Some(&arch_ctx))
            .await
        {
            Ok(plan) => {
                self.base.tracker().end_phase(Some(true), None, "");
                plan
            }
            Err(e) => {
                self.base.tracker().end_phase(Some(false), None, &e.to_string());
                session.record_step("Modification Planning", format!("planning failed: {e}"), Some(false), Utc::now());
                return Ok(Self::sanitize(&self.build_result(&session, "reject", &format!("planning failed: {e}"), knowledge_applied, None, "")));
            }
        };
        session.modification_plan = Some(plan.clone());
        session.record_step("Modification Planning", format!("generated {} steps", plan.len()), Some(true), Utc::now());

        // Step 6: execute modifications (C11).
        let mut healing_round_used = false;
        let mut modified_files;
        let mut files_to_delete;
        let mut fallbacks_applied;

        self.base.tracker().start_phase("execution", "Code Modification", &exec_model_id);
        match self.step_executor.execute(&plan, &project_root).await {
            Ok(outcome) => {
                self.base.tracker().end_phase(Some(true), None, "");
                modified_files = outcome.modified_files;
                files_to_delete = outcome.files_to_delete;
                fallbacks_applied = outcome.fallbacks_applied;
                session.record_step("Code Modification", format!("{} files modified", modified_files.len()), Some(true), Utc::now());
            }
            Err(e) => {
                self.base.tracker().end_phase(Some(false), None, &e.to_string());
                session.record_step("Code Modification", format!("execution failed: {e}"), Some(false), Utc::now());
                healing_round_used = true;
                let analysis = analyze_failure_patterns(&[e.to_string()]);
                let mut empty_files = HashMap::new();

                self.base.tracker().start_phase("healing", "Self-Healing", &plan_model_id);
                let healing_outcome = match self
                    .healing_controller
                    .execute_self_healing(&analysis, &mut empty_files, &input.task, &project_root, &self.plan_generator, Some(&arch_ctx), self.knowledge.as_deref())
                    .await
                {
                    Ok(outcome) => {
                        self.base.tracker().end_phase(Some(true), None, "");
                        outcome
                    }
                    Err(he) => {
                        self.base.tracker().end_phase(Some(false), None, &he.to_string());
                        let reason = format!("execution failed and could not be recovered: {e}; healing errored: {he}");
                        return Ok(Self::sanitize(&self.build_result(&session, "reject", &reason, knowledge_applied, None, "")));
                    }
                };
                session.record_step("Self-Healing", format!("strategy={}", healing_outcome.strategy), Some(healing_outcome.updated_plan.is_some()), Utc::now());

                let Some(new_plan) = healing_outcome.updated_plan else {
                    let reason = format!("execution failed and could not be recovered: {e}");
                    return Ok(Self::sanitize(&self.build_result(&session, "reject", &reason, knowledge_applied, None, "")));
                };
                plan = new_plan;
                self.base.tracker().start_phase("execution-retry", "Code Modification (post-healing)", &exec_model_id);
                match self.step_executor.execute(&plan, &project_root).await {
                    Ok(outcome) => {
                        self.base.tracker().end_phase(Some(true), None, "");
                        modified_files = outcome.modified_files;
                        files_to_delete = outcome.files_to_delete;
                        fallbacks_applied = outcome.fallbacks_applied;
                    }
                    Err(e2) => {
                        self.base.tracker().end_phase(Some(false), None, &e2.to_string());
                        let reason = format!("execution failed after replan: {e2}");
                        return Ok(Self::sanitize(&self.build_result(&session, "reject", &reason, knowledge_applied, None, "")));
                    }
                }
            }
        }

        // Step 7: validate quality (C12) and operations (C13).
        let analysis_summary = session.analysis.as_ref().map(|v| v.to_string()).unwrap_or_default();
        let manifests = self.read_manifests(&project_root).await;
        let all_project_files = self.read_all_project_files(&project_root).await;

        let mut quality = self.quality_validator.validate(&modified_files, &input.task, &analysis_summary).await;
        let mut sre = self.operational_validator.validate(&modified_files, &manifests, &all_project_files);
        session.record_step("Quality Validation", format!("passed={}", quality.passed), Some(quality.passed), Utc::now());
        session.record_step("Operational Validation", format!("passed={}", sre.passed), Some(sre.passed), Utc::now());

        // Step 8: self-heal on failure, bounded to one round overall.
        if (!quality.passed || !sre.passed) && !healing_round_used {
            healing_round_used = true;
            let mut combined_issues = quality.issues.clone();
            combined_issues.extend(sre.issues.clone());
            let analysis = analyze_failure_patterns(&combined_issues);

            self.base.tracker().start_phase("healing", "Self-Healing", &plan_model_id);
            let healing_outcome = match self
                .healing_controller
                .execute_self_healing(&analysis, &mut modified_files, &input.task, &project_root, &self.plan_generator, Some(&arch_ctx), self.knowledge.as_deref())
                .await
            {
                Ok(outcome) => {
                    self.base.tracker().end_phase(Some(true), None, "");
                    outcome
                }
                Err(he) => {
                    self.base.tracker().end_phase(Some(false), None, &he.to_string());
                    let reason = format!("self-healing errored: {he}");
                    return Ok(Self::sanitize(&self.build_result(&session, "reject", &reason, knowledge_applied, None, "")));
                }
            };
            session.record_step("Self-Healing", format!("strategy={}", healing_outcome.strategy), Some(true), Utc::now());

            if let Some(new_plan) = healing_outcome.updated_plan {
                plan = new_plan;
                self.base.tracker().start_phase("execution-retry", "Code Modification (post-healing)", &exec_model_id);
                match self.step_executor.execute(&plan, &project_root).await {
                    Ok(outcome) => {
                        self.base.tracker().end_phase(Some(true), None, "");
                        modified_files = outcome.modified_files;
                        files_to_delete = outcome.files_to_delete;
                        fallbacks_applied = outcome.fallbacks_applied;
                    }
                    Err(e) => {
                        self.base.tracker().end_phase(Some(false), None, &e.to_string());
                    }
                }
            }

            quality = self.quality_validator.validate(&modified_files, &input.task, &analysis_summary).await;
            sre = self.operational_validator.validate(&modified_files, &manifests, &all_project_files);
            session.record_step("Quality Validation", format!("re-validation passed={}", quality.passed), Some(quality.passed), Utc::now());
            session.record_step("Operational Validation", format!("re-validation passed={}", sre.passed), Some(sre.passed), Utc::now());

            if healing_outcome.escalated {
                let reason = healing_outcome.notes.join("; ");
                return Ok(Self::sanitize(&self.build_result(&session, "reject", &reason, knowledge_applied, None, "")));
            }
        }

        // Step 9: decide.
        let decision = if quality.passed && sre.passed { "approve" } else { "reject" };
        let reason = if decision == "approve" {
            String::new()
        } else {
            let mut all_issues = quality.issues.clone();
            all_issues.extend(sre.issues.clone());
            all_issues.join("; ")
        };
        session.record_step("Final Decision", format!("decision={decision}"), Some(decision == "approve"), Utc::now());

        if decision == "approve" {
            let outcome = crate::execution::ExecutionOutcome {
                modified_files: modified_files.clone(),
                files_to_delete: files_to_delete.clone(),
                fallbacks_applied: fallbacks_applied.clone(),
            };
            if let Err(e) = commit_outcome(self.filesystem.as_ref(), &project_root, &outcome).await {
                session.record_step("Commit", format!("commit failed: {e}"), Some(false), Utc::now());
                return Ok(Self::sanitize(&self.build_result(&session, "reject", &format!("commit failed: {e}"), knowledge_applied, None, "")));
            }
        }

        session.modified_files = modified_files.clone();
        session.modification_result = Some(ModificationResult {
            modified_files: modified_files.keys().cloned().collect(),
            files_deleted: files_to_delete.clone(),
            fallbacks_applied: fallbacks_applied.clone(),
        });
        session.quality_results = Some(serde_json::to_value(&quality).unwrap_or(Value::Null));
        session.sre_results = Some(serde_json::to_value(&sre).unwrap_or(Value::Null));

        // Step 10: score knowledge application per modified file (spec
        // §4.8) and record the results under session_state["knowledge_effectiveness"].
        let mut knowledge_score = None;
        let mut knowledge_feedback = String::new();
        if knowledge_applied {
            let patterns = default_patterns_for_step_type("code_generation");
            let mut scores = Vec::with_capacity(modified_files.len());
            let mut feedback_lines = Vec::new();
            for (file, content) in &modified_files {
                let scoring = score_pattern_application(content, &patterns);
                scores.push(scoring.overall_score);
                if !scoring.feedback.is_empty() {
                    feedback_lines.push(format!("{file}: {}", scoring.feedback.join("; ")));
                }
                let mut entry = serde_json::to_value(&scoring).unwrap_or(Value::Null);
                if let Some(obj) = entry.as_object_mut() {
                    obj.insert("file".to_string(), Value::String(file.clone()));
                }
                session.knowledge_effectiveness.push(entry);
            }
            if !scores.is_empty() {
                knowledge_score = Some(scores.iter().sum::<f64>() / scores.len() as f64);
            }
            knowledge_feedback = feedback_lines.join("; ");
        }

        if !quality.passed {
            warn!(reason = %reason, "orchestration rejected modifications");
        } else {
            info!(decision, "orchestration completed");
        }

        self.base.tracker().complete_operation(decision == "approve", Some(serde_json::json!({"decision": decision})));

        Ok(Self::sanitize(&self.build_result(&session, decision, &reason, knowledge_applied, knowledge_score, &knowledge_feedback)))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        session: &SessionState,
        decision: &str,
        reason: &str,
        knowledge_applied: bool,
        knowledge_score: Option<f64>,
        knowledge_feedback: &str,
    ) -> Value {
        let mut result = serde_json::json!({
            "decision": decision,
            "reason": reason,
            "modifications": session.modified_files,
            "quality_results": session.quality_results,
            "sre_results": session.sre_results,
            "reasoning_trajectory": session.reasoning_trajectory,
            "knowledge_applied": knowledge_applied,
            "knowledge_effectiveness": session.knowledge_effectiveness,
            "cost_summary": self.base.tracker().get_cost_summary(),
        });
        if let Some(score) = knowledge_score {
            result["knowledge_application_score"] = serde_json::json!(score);
        }
        if !knowledge_feedback.is_empty() {
            result["knowledge_feedback"] = serde_json::json!(knowledge_feedback);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::manager::{AlwaysApprove, AlwaysDeny};
    use crate::config::EngineConfig;
    use crate::providers::filesystem::TokioProjectFilesystem;
    use crate::providers::llm::StaticLlmProvider;
    use crate::providers::vector_store::InMemoryVectorStore;
    use tempfile::tempdir;

    fn agent_with(plan_response: &str, modifier_response: &str, budget_manager: Arc<BudgetManager>) -> OrchestrationAgent {
        let fs: Arc<dyn ProjectFilesystem> = Arc::new(TokioProjectFilesystem::new());
        let mut registry = ModelRegistry::new();
        registry.register(ModelTier::Highest, Box::new(StaticLlmProvider::new("model-highest", plan_response)));
        registry.register(ModelTier::Middle, Box::new(StaticLlmProvider::new("model-middle", modifier_response)));
        let models = Arc::new(registry);
        let store: Arc<dyn crate::providers::vector_store::VectorStore> = Arc::new(InMemoryVectorStore::new());
        let quality = QualityValidator::new(store, None);
        OrchestrationAgent::new(fs, models, budget_manager, quality, None)
    }

    #[tokio::test]
    async fn trivial_approve_scenario() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("math.py"), "def add(a, b):\n    return a + b\n").await.unwrap();

        let budget_manager = Arc::new(BudgetManager::new(EngineConfig::default_local(), Box::new(AlwaysApprove)));
        let plan_response = "[{\"file\": \"math.py\", \"action\": \"modify\", \"what\": \"add docstring\", \"how\": \"insert docstring\"}]";
        let modifier_response = "def add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n";
        let agent = agent_with(plan_response, modifier_response, budget_manager);

        let objective = serde_json::json!({
            "task": "Add docstring to add() in math.py",
            "project_path": dir.path().to_string_lossy(),
            "constraints": [],
        });
        let result = agent.execute(objective).await.unwrap();
        assert_eq!(result["decision"], "approve");
        assert!(result["modifications"]["math.py"].as_str().unwrap().contains("Add two numbers"));

        let steps: Vec<String> = result["reasoning_trajectory"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["step"].as_str().unwrap().to_string())
            .collect();
        assert!(steps.contains(&"Project Context Analysis".to_string()));
        assert!(steps.contains(&"Final Decision".to_string()));
    }

    #[tokio::test]
    async fn budget_rejection_scenario() {
        let dir = tempdir().unwrap();
        let mut config = EngineConfig::default_local();
        config.budget.session_budget = Some(0.0);
        let budget_manager = Arc::new(BudgetManager::new(config, Box::new(AlwaysDeny)));
        let agent = agent_with("[]", "irrelevant", budget_manager);

        let objective = serde_json::json!({
            "task": "do something substantial and non-trivial with a long prompt ".repeat(50),
            "project_path": dir.path().to_string_lossy(),
        });
        let result = agent.execute(objective).await.unwrap();
        assert_eq!(result["decision"], "reject");
        assert!(result["reason"].as_str().unwrap().contains("budget"));
    }

    #[tokio::test]
    async fn missing_required_fields_returns_reject_decision() {
        let budget_manager = Arc::new(BudgetManager::with_always_approve(EngineConfig::default_local()));
        let agent = agent_with("[]", "irrelevant", budget_manager);
        let result = agent.execute(serde_json::json!({"task": ""})).await.unwrap();
        assert_eq!(result["decision"], "reject");
        assert!(result["reason"].as_str().unwrap().to_lowercase().contains("missing required fields"));
    }

    #[tokio::test]
    async fn fullstack_architectural_placement_scenario() {
        let dir = tempdir().unwrap();
        let budget_manager = Arc::new(BudgetManager::with_always_approve(EngineConfig::default_local()));
        let plan_response = "[{\"file\": \"health.py\", \"action\": \"create\", \"what\": \"api health endpoint\", \"how\": \"fastapi route\"}, \
             {\"file\": \"App.jsx\", \"action\": \"create\", \"what\": \"ui component\", \"how\": \"react component\"}]";
        let agent = agent_with(plan_response, "def health():\n    return {}\n", budget_manager);

        let objective = serde_json::json!({
            "task": "create a web app with React frontend and FastAPI backend returning /api/health",
            "project_path": dir.path().to_string_lossy(),
        });
        let result = agent.execute(objective).await.unwrap();
        assert_eq!(result["decision"], "approve");
        let mods = result["modifications"].as_object().unwrap();
        assert!(mods.keys().any(|k| k.starts_with("backend/") && k.ends_with(".py")));
        assert!(mods.keys().any(|k| k.starts_with("frontend/src/") && k.ends_with(".jsx")));
    }
}

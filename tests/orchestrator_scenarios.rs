//! End-to-end orchestrator scenarios that only surface through a full
//! `OrchestrationAgent::execute` run: a self-healing round triggered by a
//! reported syntax issue, and one triggered by a reported performance issue
//! that re-plans onto a different file.

use std::sync::Arc;

use evo_factory::providers::vector_store::CodeContextRecord;
use evo_factory::{
    AlwaysApprove, BudgetManager, EngineConfig, InMemoryVectorStore, ModelRegistry, ModelTier,
    OrchestrationAgent, ProjectFilesystem, QualityValidator, StaticLlmProvider,
    TokioProjectFilesystem, VectorStore,
};
use tempfile::tempdir;

fn agent(
    plan_responses: Vec<String>,
    modifier_response: &str,
    store: Arc<InMemoryVectorStore>,
) -> OrchestrationAgent {
    let fs: Arc<dyn ProjectFilesystem> = Arc::new(TokioProjectFilesystem::new());
    let mut registry = ModelRegistry::new();
    registry.register(
        ModelTier::Highest,
        Box::new(StaticLlmProvider::new("model-highest", "[]").with_queue(plan_responses)),
    );
    registry.register(ModelTier::Middle, Box::new(StaticLlmProvider::new("model-middle", modifier_response)));
    let models = Arc::new(registry);

    let quality_store: Arc<dyn VectorStore> = store;
    let quality_validator = QualityValidator::new(quality_store, None);
    let budget_manager = Arc::new(BudgetManager::new(EngineConfig::default_local(), Box::new(AlwaysApprove)));
    OrchestrationAgent::new(fs, models, budget_manager, quality_validator, None)
}

fn lint_record(path: &str, issue: &str) -> CodeContextRecord {
    CodeContextRecord {
        path: path.to_string(),
        chunk_name: "module".to_string(),
        chunk_type: "module".to_string(),
        content: String::new(),
        vector: vec![],
        start_line: 1,
        end_line: 1,
        content_hash: "seed".to_string(),
        language: "python".to_string(),
        lint_errors: vec![issue.to_string()],
        dependencies: vec![],
    }
}

#[tokio::test]
async fn self_heals_on_reported_syntax_issue() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    store.upsert_code_context(lint_record("calc.py", "syntax error: incompatible with legacy interpreter")).await.unwrap();

    let plan = "[{\"file\": \"calc.py\", \"action\": \"create\", \"what\": \"add function\", \"how\": \"implement\"}]".to_string();
    let agent = agent(vec![plan], "def f(x):\n    return x\n", store);

    let objective = serde_json::json!({
        "task": "add a helper function to calc.py",
        "project_path": dir.path().to_string_lossy(),
    });
    let result = agent.execute(objective).await.unwrap();

    let trajectory: Vec<(String, String)> = result["reasoning_trajectory"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["step"].as_str().unwrap().to_string(), e["description"].as_str().unwrap().to_string()))
        .collect();

    let healing_steps: Vec<&(String, String)> = trajectory.iter().filter(|(step, _)| step == "Self-Healing").collect();
    assert_eq!(healing_steps.len(), 1, "healing must run at most once");
    assert!(healing_steps[0].1.contains("auto_fix_syntax"));
    assert!(result["reason"].as_str().unwrap_or_default().contains("syntax error") || result["decision"] == "reject");
}

#[tokio::test]
async fn replans_onto_a_different_file_on_reported_performance_issue() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    store.upsert_code_context(lint_record("loop.py", "performance timeout in loop")).await.unwrap();

    let first_plan = "[{\"file\": \"loop.py\", \"action\": \"create\", \"what\": \"process items in a loop\", \"how\": \"implement\"}]".to_string();
    let replanned = "[{\"file\": \"loop_fast.py\", \"action\": \"create\", \"what\": \"process items faster\", \"how\": \"implement\"}]".to_string();
    let agent = agent(vec![first_plan, replanned], "def fast(x):\n    return x\n", store);

    let objective = serde_json::json!({
        "task": "process a large collection of items",
        "project_path": dir.path().to_string_lossy(),
    });
    let result = agent.execute(objective).await.unwrap();

    let trajectory: Vec<(String, String)> = result["reasoning_trajectory"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["step"].as_str().unwrap().to_string(), e["description"].as_str().unwrap().to_string()))
        .collect();
    let healing_steps: Vec<&(String, String)> = trajectory.iter().filter(|(step, _)| step == "Self-Healing").collect();
    assert_eq!(healing_steps.len(), 1);
    assert!(healing_steps[0].1.contains("replan_performance"));

    assert_eq!(result["decision"], "approve");
    let mods = result["modifications"].as_object().unwrap();
    assert!(mods.contains_key("loop_fast.py"));
    assert!(!mods.contains_key("loop.py"));
}

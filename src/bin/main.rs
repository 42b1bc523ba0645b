use std::sync::Arc;

use anyhow::{Context, Result};
use evo_factory::cli::{Cli, Commands};
use evo_factory::{
    BudgetManager, EngineConfig, HttpLlmProvider, InMemoryVectorStore, KnowledgeRetriever,
    ModelRegistry, ModelTier, OrchestrationAgent, QualityValidator, TokioProjectFilesystem,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path).with_context(|| format!("loading config from {path:?}"))?,
        None => EngineConfig::default_local(),
    };
    if cli.verbose > 0 {
        config.logging.level = match cli.verbose {
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
        .to_string();
    }

    evo_factory::observability::init_tracing(&config.logging)?;
    evo_factory::metrics::init_metrics(&config.metrics)?;
    info!(version = evo_factory::VERSION, "evo-factory starting");

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run {
            task,
            project_path,
            constraint,
            quality_gate,
            original_idea,
            output,
        } => {
            let agent = build_agent(&config)?;
            let objective = serde_json::json!({
                "task": task,
                "project_path": project_path.to_string_lossy(),
                "constraints": constraint,
                "quality_gates": quality_gate,
                "original_idea": original_idea.unwrap_or_default(),
            });

            let result = agent.execute(objective).await.context("orchestration run failed")?;

            match output.as_str() {
                "json" => println!("{}", serde_json::to_string(&result)?),
                _ => println!("{}", serde_json::to_string_pretty(&result)?),
            }
        }
    }

    Ok(())
}

/// Wires an [`OrchestrationAgent`] from config. Every LLM tier resolves to
/// the same endpoint (`EVO_LLM_ENDPOINT`, defaulting to a local placeholder)
/// with a per-tier model id — concrete vendor routing is out of core scope
/// (spec §1 Non-goals), so this is the one adapter every deployment is
/// expected to point at its own gateway.
fn build_agent(config: &EngineConfig) -> Result<OrchestrationAgent> {
    let endpoint = std::env::var("EVO_LLM_ENDPOINT").unwrap_or_else(|_| "http://localhost:11434/v1/chat".to_string());
    let endpoint = url::Url::parse(&endpoint).context("invalid EVO_LLM_ENDPOINT")?;

    let mut registry = ModelRegistry::new();
    for tier in [ModelTier::Highest, ModelTier::Middle, ModelTier::Small, ModelTier::Xs] {
        let model_id = config.model_for_tier(tier);
        registry.register(tier, Box::new(HttpLlmProvider::new(model_id, endpoint.clone())));
    }
    let models = Arc::new(registry);

    let filesystem = Arc::new(TokioProjectFilesystem::new());
    let budget_manager = Arc::new(BudgetManager::with_always_approve(config.clone()));

    let store: Arc<InMemoryVectorStore> = Arc::new(InMemoryVectorStore::new());
    let quality_validator = QualityValidator::new(store.clone(), None);

    let embedder = Arc::new(evo_factory::providers::vector_store::InMemoryEmbeddingModel::new(32));
    let knowledge = Some(Arc::new(KnowledgeRetriever::new(embedder, store)));

    Ok(OrchestrationAgent::new(filesystem, models, budget_manager, quality_validator, knowledge))
}

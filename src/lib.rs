//! Evo Factory — autonomous software-evolution orchestration engine.
//!
//! A single [`orchestrator::OrchestrationAgent`] drives an objective (a task
//! plus a project) through context analysis, planning, code modification,
//! quality/operational validation, and bounded self-healing, producing an
//! approve/reject decision with a full reasoning trajectory.

pub mod agents;
pub mod architecture;
pub mod budget;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod execution;
pub mod healing;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod planning;
pub mod providers;
pub mod session;
pub mod trajectory;
pub mod validation;

pub use error::{FactoryError, Result};

pub use config::EngineConfig;

pub use cost::Cost;

pub use budget::{AlwaysApprove, AlwaysDeny, ApprovalSink, BudgetManager, BudgetScope};

pub use providers::{
    HttpLlmProvider, InMemoryVectorStore, LlmMessage, LlmProvider, LlmResponse, ModelRegistry,
    ModelTier, ProjectFilesystem, StaticLlmProvider, TokioProjectFilesystem, VectorStore,
};

pub use agents::knowledge::KnowledgeRetriever;
pub use agents::{ReflectiveOperator, ReflectiveOperatorBase};

pub use architecture::{ArchitecturalContext, SystemType};

pub use planning::{Plan, PlanGenerator};

pub use execution::{StepExecutor, StepExecutionError};

pub use healing::{FailureAnalysis, HealingOutcome, SelfHealingController};

pub use validation::{OperationalReport, OperationalValidator, QualityReport, QualityValidator};

pub use session::SessionState;

pub use orchestrator::OrchestrationAgent;

/// Crate version, for `--version` output and structured startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

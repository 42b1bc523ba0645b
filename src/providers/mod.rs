//! External collaborators.
//!
//! The orchestration engine treats the LLM providers, the vector database,
//! the embedding model, and the project filesystem as external collaborators
//! with defined interfaces (spec §1, §6) — this module defines those seams
//! as traits plus in-memory/test doubles, following how `llm-cost-ops` keeps
//! its external services (ruvector, email, webhook targets) behind narrow
//! client types and ships in-memory doubles for tests.

pub mod filesystem;
pub mod llm;
pub mod vector_store;

pub use filesystem::{ProjectFilesystem, TokioProjectFilesystem};
pub use llm::{
    HttpLlmProvider, LlmMessage, LlmProvider, LlmResponse, LlmUsage, ModelRegistry, ModelTier,
    StaticLlmProvider,
};
pub use vector_store::{
    CodeContextRecord, EmbeddingModel, InMemoryEmbeddingModel, InMemoryVectorStore,
    KnowledgeBaseRecord, VectorStore,
};

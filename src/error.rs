//! Crate-wide error type.
//!
//! Every failure path in the engine — budget denial, provider errors, invalid
//! LLM output, missing files, validation failures — is folded into a single
//! enum so callers (the orchestrator, the CLI) have one `Result` alias to
//! reason about.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FactoryError>;

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("budget denied: {0}")]
    BudgetDenied(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid LLM output: {0}")]
    InvalidOutput(String),

    #[error("referenced file missing: {0}")]
    FileMissing(String),

    #[error("no active phase")]
    NoActivePhase,

    #[error("internal error: {0}")]
    Internal(String),
}

impl FactoryError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        FactoryError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        FactoryError::Validation(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        FactoryError::Internal(msg.into())
    }
}

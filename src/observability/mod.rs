//! Tracing subscriber initialization.
//!
//! Mirrors the teacher's `observability::tracing::init_tracing`, trimmed to
//! what this engine actually has logging needs for: an env filter layered
//! over the configured level, and a choice of JSON or compact text
//! formatting. There's no HTTP surface in this crate, so the teacher's
//! correlation-id/trace-context propagation (built for its axum service)
//! has no counterpart here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{FactoryError, Result};

/// Initializes the global tracing subscriber from `config`. Safe to call at
/// most once per process; a second call returns an error rather than
/// panicking, so callers (tests included) can guard it with `try_init`
/// semantics.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| FactoryError::config(format!("invalid log level {:?}: {e}", config.level)))?;

    let registry = Registry::default().with(env_filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .try_init()
            .map_err(|e| FactoryError::internal(format!("failed to initialize tracing: {e}")))?;
    } else {
        registry
            .with(fmt::layer().compact().with_target(true).with_level(true))
            .try_init()
            .map_err(|e| FactoryError::internal(format!("failed to initialize tracing: {e}")))?;
    }

    Ok(())
}

//! Prometheus metrics recorder.
//!
//! Grounded in the teacher's `metrics::recorder::init_metrics`: a config
//! struct controlling whether metrics are installed at all and where the
//! Prometheus exporter listens, plus a set of recording helpers the rest of
//! the engine calls into. Counter/histogram names are this engine's own
//! (session cost, phase durations, healing rounds) rather than the
//! teacher's LLM-cost-specific ones.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{FactoryError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub prometheus_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prometheus_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Installs the global Prometheus recorder. A no-op when `config.enabled`
/// is false, which is the default — most test and one-shot CLI runs never
/// want a listening HTTP server.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        tracing::info!("metrics collection disabled");
        return Ok(());
    }

    let addr: SocketAddr = config
        .prometheus_addr
        .parse()
        .map_err(|e| FactoryError::config(format!("invalid prometheus address: {e}")))?;

    tracing::info!(addr = %addr, "installing prometheus exporter");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| FactoryError::internal(format!("failed to install prometheus exporter: {e}")))?;

    metrics::counter!("evo_factory_info", 1);
    Ok(())
}

/// Records one `OrchestrationAgent::execute` phase's token/cost consumption
/// (spec §9's reasoning-trajectory entries double as the metrics source).
pub fn record_phase_cost(phase: &str, tokens: u64, cost: f64) {
    metrics::counter!("evo_factory_phase_tokens_total", tokens, "phase" => phase.to_string());
    metrics::counter!("evo_factory_phase_cost_total", (cost * 1_000_000.0).round() as u64, "phase" => phase.to_string());
}

/// Records one phase's wall-clock duration.
pub fn record_phase_duration(phase: &str, elapsed: Duration) {
    metrics::histogram!("evo_factory_phase_duration_ms", elapsed.as_millis() as f64, "phase" => phase.to_string());
}

/// Records a self-healing round and whether it resolved the failure.
pub fn record_healing_round(strategy: &str, resolved: bool) {
    metrics::counter!(
        "evo_factory_healing_rounds_total",
        1,
        "strategy" => strategy.to_string(),
        "resolved" => resolved.to_string()
    );
}

/// Records a budget approval decision.
pub fn record_budget_decision(approved: bool) {
    metrics::counter!("evo_factory_budget_decisions_total", 1, "approved" => approved.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
    }

    #[test]
    fn disabled_config_is_a_no_op() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn recording_helpers_do_not_panic_without_an_installed_recorder() {
        record_phase_cost("Modification Planning", 120, 0.003);
        record_phase_duration("Modification Planning", Duration::from_millis(50));
        record_healing_round("auto_fix_syntax", true);
        record_budget_decision(true);
    }
}

//! C2 — Budget Manager.
//!
//! Session-wide token/cost accounting and the top-level approval gate (spec
//! §4.2). A single instance is shared by every [`crate::agents::ReflectiveOperator`]
//! for the lifetime of one [`crate::orchestrator::OrchestrationAgent::execute`]
//! call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::cost::{self, Cost};
use crate::metrics;

/// An external approver — interactive (a human at a terminal) or
/// programmatic (a policy engine, or a test double that always says yes/no).
#[async_trait]
pub trait ApprovalSink: Send + Sync {
    async fn approve(&self, description: &str, model_id: &str, estimated: Cost) -> bool;
}

/// Approves everything. Used by the CLI in non-interactive mode and by most
/// tests.
pub struct AlwaysApprove;

#[async_trait]
impl ApprovalSink for AlwaysApprove {
    async fn approve(&self, _description: &str, _model_id: &str, _estimated: Cost) -> bool {
        true
    }
}

/// Rejects everything past the auto-approve threshold. Used to exercise the
/// budget-rejection scenario (spec §8 scenario 2).
pub struct AlwaysDeny;

#[async_trait]
impl ApprovalSink for AlwaysDeny {
    async fn approve(&self, _description: &str, _model_id: &str, _estimated: Cost) -> bool {
        false
    }
}

#[derive(Default)]
struct ConsumptionState {
    consumed_tokens: u64,
    consumed_cost: f64,
    per_provider: HashMap<String, Cost>,
}

pub struct BudgetManager {
    config: EngineConfig,
    session_budget: Option<f64>,
    auto_approve_threshold: f64,
    approver: Box<dyn ApprovalSink>,
    state: Mutex<ConsumptionState>,
}

impl BudgetManager {
    pub fn new(config: EngineConfig, approver: Box<dyn ApprovalSink>) -> Self {
        let session_budget = config.budget.session_budget;
        let auto_approve_threshold = config.budget.auto_approve_threshold;
        info!(
            session_budget = ?session_budget,
            "BudgetManager initialized"
        );
        Self {
            config,
            session_budget,
            auto_approve_threshold,
            approver,
            state: Mutex::new(ConsumptionState::default()),
        }
    }

    pub fn with_always_approve(config: EngineConfig) -> Self {
        Self::new(config, Box::new(AlwaysApprove))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Estimates tokens and cost for `prompt` against `model_id`. Delegates
    /// to C1.
    pub fn estimate(&self, prompt: &str, model_id: &str) -> Cost {
        cost::estimate(prompt, model_id, &self.config)
    }

    fn fits_session_budget(&self, state: &ConsumptionState, additional_cost: f64) -> bool {
        match self.session_budget {
            None => true,
            Some(budget) => state.consumed_cost + additional_cost <= budget,
        }
    }

    fn accrue(&self, state: &mut ConsumptionState, model_id: &str, estimated: Cost) {
        state.consumed_tokens += estimated.tokens;
        state.consumed_cost += estimated.cost;
        let entry = state.per_provider.entry(model_id.to_string()).or_insert(Cost::ZERO);
        *entry = *entry + estimated;
    }

    /// Implements spec §4.2's four-step approval algorithm. Rejection never
    /// mutates the accumulators (spec §8 invariant).
    pub async fn request_approval(&self, description: &str, prompt: &str, model_id: &str) -> bool {
        let estimated = self.estimate(prompt, model_id);

        if estimated.cost < self.auto_approve_threshold {
            let mut state = self.state.lock().unwrap();
            self.accrue(&mut state, model_id, estimated);
            metrics::record_budget_decision(true);
            return true;
        }

        {
            let state = self.state.lock().unwrap();
            if !self.fits_session_budget(&state, estimated.cost) {
                warn!(
                    description,
                    estimated_cost = estimated.cost,
                    "budget denied: estimated cost exceeds remaining session budget"
                );
                metrics::record_budget_decision(false);
                return false;
            }
        }

        let approved = self.approver.approve(description, model_id, estimated).await;
        metrics::record_budget_decision(approved);
        if approved {
            let mut state = self.state.lock().unwrap();
            self.accrue(&mut state, model_id, estimated);
            true
        } else {
            warn!(description, "budget request rejected by approver");
            false
        }
    }

    /// Reconciles an estimate with the actual usage a real provider reports
    /// after the call completes (spec §4.2).
    pub fn update_from_metrics(&self, model_id: &str, actual: Cost) {
        let mut state = self.state.lock().unwrap();
        self.accrue(&mut state, model_id, actual);
    }

    pub fn get_session_consumption(&self) -> (u64, f64) {
        let state = self.state.lock().unwrap();
        (state.consumed_tokens, state.consumed_cost)
    }

    pub fn per_provider_consumption(&self) -> HashMap<String, Cost> {
        self.state.lock().unwrap().per_provider.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_budget(budget: Option<f64>) -> EngineConfig {
        let mut config = EngineConfig::default_local();
        config.budget.session_budget = budget;
        config
    }

    #[tokio::test]
    async fn small_costs_are_auto_approved_and_tracked() {
        let manager = BudgetManager::with_always_approve(config_with_budget(None));
        let approved = manager.request_approval("tiny op", "hi", "model-xs").await;
        assert!(approved);
        let (tokens, cost) = manager.get_session_consumption();
        assert!(tokens > 0);
        assert!(cost >= 0.0);
    }

    #[tokio::test]
    async fn rejection_leaves_counters_unchanged() {
        let manager = BudgetManager::new(config_with_budget(Some(0.0)), Box::new(AlwaysApprove));
        let before = manager.get_session_consumption();
        let big_prompt = "x".repeat(40_000);
        let approved = manager.request_approval("big op", &big_prompt, "model-highest").await;
        assert!(!approved);
        let after = manager.get_session_consumption();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn always_deny_approver_rejects_above_threshold() {
        let manager = BudgetManager::new(config_with_budget(None), Box::new(AlwaysDeny));
        let big_prompt = "x".repeat(40_000);
        let approved = manager.request_approval("big op", &big_prompt, "model-highest").await;
        assert!(!approved);
    }

    #[tokio::test]
    async fn metrics_update_accrues_without_approval_round_trip() {
        let manager = BudgetManager::with_always_approve(config_with_budget(None));
        manager.update_from_metrics("model-middle", Cost::new(100, 0.01));
        let (tokens, cost) = manager.get_session_consumption();
        assert_eq!(tokens, 100);
        assert!((cost - 0.01).abs() < 1e-9);
    }
}

//! C3 — Phase Cost Tracker.
//!
//! One instance per operation (one call to
//! [`crate::orchestrator::OrchestrationAgent::execute`]). Tracks a
//! multi-phase trajectory of reasoning steps, appending frozen phases to an
//! append-only, JSON-serializable trajectory (spec §4.3).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::budget::BudgetManager;
use crate::cost::{self, Cost};
use crate::error::{FactoryError, Result};
use crate::metrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_id: String,
    pub prompt: String,
    pub response: String,
    pub tokens_consumed: u64,
    pub cost_incurred: f64,
    pub model_id: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub context_chunks_used: Vec<String>,
    pub validation_outcome: Option<bool>,
    pub validation_feedback: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub success: Option<bool>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub phase_id: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub model_used: String,
    pub tokens_consumed: u64,
    pub cost_incurred: f64,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub outcome: PhaseOutcome,
}

impl Phase {
    fn new(phase_id: impl Into<String>, description: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            phase_id: phase_id.into(),
            description: description.into(),
            start_time: Utc::now(),
            end_time: None,
            model_used: model_used.into(),
            tokens_consumed: 0,
            cost_incurred: 0.0,
            reasoning_steps: Vec::new(),
            outcome: PhaseOutcome::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationTrajectory {
    pub operation_id: String,
    pub operation_type: String,
    pub phases: Vec<Phase>,
    pub total_tokens_consumed: u64,
    pub total_cost_incurred: f64,
    pub overall_success: Option<bool>,
    pub final_result: Option<Value>,
}

impl OperationTrajectory {
    fn new(operation_id: impl Into<String>, operation_type: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            operation_type: operation_type.into(),
            ..Default::default()
        }
    }
}

impl Default for OperationTrajectory {
    fn default() -> Self {
        Self {
            operation_id: String::new(),
            operation_type: String::new(),
            phases: Vec::new(),
            total_tokens_consumed: 0,
            total_cost_incurred: 0.0,
            overall_success: None,
            final_result: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseCostSummary {
    pub phase_id: String,
    pub tokens: u64,
    pub cost: f64,
    pub step_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub phases: Vec<PhaseCostSummary>,
    pub total_tokens: u64,
    pub total_cost: f64,
}

pub struct PhaseCostTracker {
    budget_manager: Arc<BudgetManager>,
    current: Mutex<Option<Phase>>,
    trajectory: Mutex<OperationTrajectory>,
}

impl PhaseCostTracker {
    pub fn new(budget_manager: Arc<BudgetManager>, operation_id: impl Into<String>, operation_type: impl Into<String>) -> Self {
        Self {
            budget_manager,
            current: Mutex::new(None),
            trajectory: Mutex::new(OperationTrajectory::new(operation_id, operation_type)),
        }
    }

    /// Starts a new phase. If another phase is current, it is auto-ended
    /// with an unknown (`None`) outcome first (spec §4.3, §8 idempotence).
    pub fn start_phase(&self, phase_id: &str, description: &str, model_id: &str) {
        {
            let current = self.current.lock().unwrap();
            if current.is_some() {
                drop(current);
                self.end_phase(None, None, "");
            }
        }
        let mut current = self.current.lock().unwrap();
        *current = Some(Phase::new(phase_id, description, model_id));
        info!(phase_id, description, "phase started");
    }

    /// Records one LLM call. Requires a current phase.
    pub fn record_reasoning_step(
        &self,
        step_id: &str,
        prompt: &str,
        response: &str,
        model_id: &str,
        tools_used: Vec<String>,
        context_chunks_used: Vec<String>,
    ) -> Result<ReasoningStep> {
        let tokens_consumed = cost::count_tokens(prompt) + cost::count_tokens(response);
        let combined = format!("{prompt}{response}");
        let estimated = cost::estimate(&combined, model_id, self.budget_manager.config());
        let cost_incurred = estimated.cost;

        let step = ReasoningStep {
            step_id: step_id.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            tokens_consumed,
            cost_incurred,
            model_id: model_id.to_string(),
            tools_used,
            context_chunks_used,
            validation_outcome: None,
            validation_feedback: None,
        };

        let mut current = self.current.lock().unwrap();
        let phase = current.as_mut().ok_or(FactoryError::NoActivePhase)?;
        phase.tokens_consumed += tokens_consumed;
        phase.cost_incurred += cost_incurred;
        phase.reasoning_steps.push(step.clone());
        let phase_id = phase.phase_id.clone();
        drop(current);

        {
            let mut trajectory = self.trajectory.lock().unwrap();
            trajectory.total_tokens_consumed += tokens_consumed;
            trajectory.total_cost_incurred += cost_incurred;
        }

        self.budget_manager
            .update_from_metrics(model_id, Cost::new(tokens_consumed, cost_incurred));
        metrics::record_phase_cost(&phase_id, tokens_consumed, cost_incurred);

        Ok(step)
    }

    /// Records a validation outcome for `step_id`. If no such step exists in
    /// the current phase (e.g. the caller mocked out the reasoning-step
    /// path in a test), a placeholder step is created so the validation is
    /// never lost — this matches the source's documented behavior
    /// (SPEC_FULL §9, Open Question 1).
    pub fn record_validation(&self, step_id: &str, outcome: bool, feedback: &str) -> Result<()> {
        let mut current = self.current.lock().unwrap();
        let phase = current.as_mut().ok_or(FactoryError::NoActivePhase)?;

        if let Some(step) = phase.reasoning_steps.iter_mut().find(|s| s.step_id == step_id) {
            step.validation_outcome = Some(outcome);
            step.validation_feedback = Some(feedback.to_string());
            return Ok(());
        }

        warn!(step_id, "recording validation for an unrecorded step; creating placeholder");
        phase.reasoning_steps.push(ReasoningStep {
            step_id: step_id.to_string(),
            prompt: "<not-recorded>".to_string(),
            response: "<not-recorded>".to_string(),
            tokens_consumed: 0,
            cost_incurred: 0.0,
            model_id: phase.model_used.clone(),
            tools_used: Vec::new(),
            context_chunks_used: Vec::new(),
            validation_outcome: Some(outcome),
            validation_feedback: Some(feedback.to_string()),
        });
        Ok(())
    }

    /// Freezes the current phase and appends it to the trajectory.
    pub fn end_phase(&self, success: Option<bool>, result: Option<Value>, feedback: &str) {
        let phase = {
            let mut current = self.current.lock().unwrap();
            current.take()
        };
        let Some(mut phase) = phase else {
            return;
        };
        let end_time = Utc::now();
        phase.end_time = Some(end_time);
        phase.outcome = PhaseOutcome {
            success,
            result,
            feedback: feedback.to_string(),
        };
        info!(phase_id = %phase.phase_id, ?success, "phase ended");
        if let Ok(elapsed) = (end_time - phase.start_time).to_std() {
            metrics::record_phase_duration(&phase.phase_id, elapsed);
        }
        self.trajectory.lock().unwrap().phases.push(phase);
    }

    /// Auto-ends any current phase (unknown outcome) and finalizes overall
    /// success.
    pub fn complete_operation(&self, success: bool, final_result: Option<Value>) {
        if self.current.lock().unwrap().is_some() {
            self.end_phase(None, None, "");
        }
        let mut trajectory = self.trajectory.lock().unwrap();
        trajectory.overall_success = Some(success);
        trajectory.final_result = final_result;
    }

    pub fn get_cost_summary(&self) -> CostSummary {
        let trajectory = self.trajectory.lock().unwrap();
        let phases = trajectory
            .phases
            .iter()
            .map(|p| PhaseCostSummary {
                phase_id: p.phase_id.clone(),
                tokens: p.tokens_consumed,
                cost: p.cost_incurred,
                step_count: p.reasoning_steps.len(),
            })
            .collect();
        CostSummary {
            phases,
            total_tokens: trajectory.total_tokens_consumed,
            total_cost: trajectory.total_cost_incurred,
        }
    }

    pub fn trajectory(&self) -> OperationTrajectory {
        self.trajectory.lock().unwrap().clone()
    }

    pub fn current_phase_id(&self) -> Option<String> {
        self.current.lock().unwrap().as_ref().map(|p| p.phase_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn tracker() -> PhaseCostTracker {
        let manager = Arc::new(BudgetManager::with_always_approve(EngineConfig::default_local()));
        PhaseCostTracker::new(manager, "op-1", "test-operation")
    }

    #[test]
    fn starting_phase_while_one_current_auto_ends_prior() {
        let tracker = tracker();
        tracker.start_phase("phase-1", "first", "model-middle");
        tracker
            .record_reasoning_step("s1", "p", "r", "model-middle", vec![], vec![])
            .unwrap();
        tracker.start_phase("phase-2", "second", "model-middle");

        let trajectory = tracker.trajectory();
        assert_eq!(trajectory.phases.len(), 1);
        assert_eq!(trajectory.phases[0].phase_id, "phase-1");
        assert_eq!(trajectory.phases[0].outcome.success, None);
        assert_eq!(trajectory.phases[0].reasoning_steps.len(), 1);
    }

    #[test]
    fn record_reasoning_step_without_phase_errors() {
        let tracker = tracker();
        let err = tracker.record_reasoning_step("s1", "p", "r", "m", vec![], vec![]);
        assert!(err.is_err());
    }

    #[test]
    fn totals_equal_sum_of_steps() {
        let tracker = tracker();
        tracker.start_phase("phase-1", "d", "model-middle");
        tracker.record_reasoning_step("s1", "hello", "world", "model-middle", vec![], vec![]).unwrap();
        tracker.record_reasoning_step("s2", "foo bar", "baz qux", "model-middle", vec![], vec![]).unwrap();
        tracker.end_phase(Some(true), None, "");

        let trajectory = tracker.trajectory();
        let sum_tokens: u64 = trajectory.phases[0].reasoning_steps.iter().map(|s| s.tokens_consumed).sum();
        assert_eq!(trajectory.total_tokens_consumed, sum_tokens);
    }

    #[test]
    fn validation_for_missing_step_creates_placeholder() {
        let tracker = tracker();
        tracker.start_phase("phase-1", "d", "model-middle");
        tracker.record_validation("never-recorded", true, "looks fine").unwrap();
        let trajectory = tracker.trajectory();
        // phase still open; inspect via end_phase
        drop(trajectory);
        tracker.end_phase(Some(true), None, "");
        let trajectory = tracker.trajectory();
        let step = &trajectory.phases[0].reasoning_steps[0];
        assert_eq!(step.step_id, "never-recorded");
        assert_eq!(step.validation_outcome, Some(true));
    }

    #[test]
    fn second_validation_overwrites_first() {
        let tracker = tracker();
        tracker.start_phase("phase-1", "d", "model-middle");
        tracker.record_reasoning_step("s1", "p", "r", "model-middle", vec![], vec![]).unwrap();
        tracker.record_validation("s1", false, "bad").unwrap();
        tracker.record_validation("s1", true, "actually fine").unwrap();
        tracker.end_phase(Some(true), None, "");
        let trajectory = tracker.trajectory();
        let step = &trajectory.phases[0].reasoning_steps[0];
        assert_eq!(step.validation_outcome, Some(true));
        assert_eq!(step.validation_feedback.as_deref(), Some("actually fine"));
    }

    #[test]
    fn complete_operation_ends_current_phase_and_sets_success() {
        let tracker = tracker();
        tracker.start_phase("phase-1", "d", "model-middle");
        tracker.complete_operation(true, Some(serde_json::json!({"ok": true})));
        let trajectory = tracker.trajectory();
        assert_eq!(trajectory.overall_success, Some(true));
        assert_eq!(trajectory.phases.len(), 1);
    }

    #[test]
    fn phase_with_success_has_nonempty_steps_and_valid_times() {
        let tracker = tracker();
        tracker.start_phase("phase-1", "d", "model-middle");
        tracker.record_reasoning_step("s1", "p", "r", "model-middle", vec![], vec![]).unwrap();
        tracker.end_phase(Some(true), None, "");
        let trajectory = tracker.trajectory();
        let phase = &trajectory.phases[0];
        assert!(phase.outcome.success.unwrap());
        assert!(phase.end_time.unwrap() >= phase.start_time);
        assert!(!phase.reasoning_steps.is_empty());
    }
}

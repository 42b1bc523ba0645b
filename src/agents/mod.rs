//! C6 — Reflective Operator Base.
//!
//! The shared run/validate/retry loop every LLM-driven agent in this crate
//! is built from. Source inheritance (`ContextAwareOperator`) is re-cast per
//! spec §9 as a capability bundle: concrete agents (knowledge retriever,
//! plan generator, step modifier) hold a [`ReflectiveOperatorBase`] and
//! implement [`ReflectiveOperator`], rather than subclassing a base class —
//! matching the `Agent` trait + composition pattern in
//! `agents::contracts`/`agents::cost_forecasting`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::budget::BudgetScope;
use crate::error::{FactoryError, Result};
use crate::providers::llm::{LlmMessage, ModelRegistry, ModelTier};
use crate::trajectory::PhaseCostTracker;
use crate::validation::{all_pass, ValidationHookRegistry, ValidationInput};

pub struct ReasoningStepRecord {
    pub step_id: String,
    pub response: String,
    pub model_id: String,
}

/// Owns one [`PhaseCostTracker`] and a top-level [`BudgetScope`], shared by
/// every reasoning step a concrete agent issues (spec §4.6).
pub struct ReflectiveOperatorBase {
    scope: Arc<BudgetScope>,
    tracker: Arc<PhaseCostTracker>,
    models: Arc<ModelRegistry>,
    hooks: ValidationHookRegistry,
    pub max_reasoning_steps: usize,
}

impl ReflectiveOperatorBase {
    pub fn new(
        scope: Arc<BudgetScope>,
        tracker: Arc<PhaseCostTracker>,
        models: Arc<ModelRegistry>,
        hooks: ValidationHookRegistry,
    ) -> Self {
        Self {
            scope,
            tracker,
            models,
            hooks,
            max_reasoning_steps: 3,
        }
    }

    pub fn tracker(&self) -> &PhaseCostTracker {
        &self.tracker
    }

    pub fn hooks(&self) -> &ValidationHookRegistry {
        &self.hooks
    }

    /// Implements spec §4.6's five-step algorithm. Returns `None` when the
    /// budget scope refuses the request.
    pub async fn execute_reasoning_step(
        &self,
        step_id: &str,
        prompt: &str,
        model_tier: ModelTier,
    ) -> Result<Option<ReasoningStepRecord>> {
        let child = self.scope.child(format!("{}-child", step_id), model_tier, None, None);

        if !child.request_approval(prompt, step_id).await {
            warn!(step_id, "reasoning step refused by budget scope");
            return Ok(None);
        }

        let model_id = self.models.get(model_tier)?.model_id().to_string();
        let provider = self.models.get(model_tier)?;
        let response = provider.response(&[LlmMessage::user(prompt)]).await?;

        self.tracker.record_reasoning_step(
            step_id,
            prompt,
            &response.message.content,
            &model_id,
            Vec::new(),
            Vec::new(),
        )?;

        info!(step_id, model_id, "reasoning step recorded");
        Ok(Some(ReasoningStepRecord {
            step_id: step_id.to_string(),
            response: response.message.content,
            model_id,
        }))
    }

    /// Runs validation hooks over `input` and records the aggregate outcome
    /// against `step_id` via the tracker.
    pub fn validate_reasoning_step(
        &self,
        step_id: &str,
        input: &ValidationInput,
        hook_types: Option<&[&str]>,
    ) -> Result<bool> {
        let results = self.hooks.run_validation_hooks(input, hook_types);
        let passed = all_pass(&results);
        let feedback = results
            .iter()
            .filter(|(_, r)| !r.outcome)
            .map(|(id, r)| format!("{id}: {}", r.feedback))
            .collect::<Vec<_>>()
            .join("; ");
        self.tracker.record_validation(step_id, passed, &feedback)?;
        Ok(passed)
    }

    /// Reusable retry loop: builds a prompt (seeded with prior validation
    /// feedback, if any), issues a reasoning step, validates it, and retries
    /// up to `max_reasoning_steps` times on failure. Returns the last
    /// response and whether it ultimately passed validation.
    pub async fn run_reasoning_loop(
        &self,
        step_prefix: &str,
        model_tier: ModelTier,
        hook_types: Option<&[&str]>,
        mut build_prompt: impl FnMut(Option<&str>) -> String,
    ) -> Result<(bool, String)> {
        let mut feedback: Option<String> = None;
        let mut last_response = String::new();

        for attempt in 0..self.max_reasoning_steps {
            let step_id = format!("{step_prefix}-{attempt}");
            let prompt = build_prompt(feedback.as_deref());

            let Some(record) = self.execute_reasoning_step(&step_id, &prompt, model_tier).await? else {
                return Err(FactoryError::BudgetDenied(format!("{step_prefix} refused by budget")));
            };
            last_response = record.response.clone();

            let passed = self.validate_reasoning_step(
                &step_id,
                &ValidationInput::Text(&record.response),
                hook_types,
            )?;
            if passed {
                return Ok((true, last_response));
            }

            let results = self.hooks.run_validation_hooks(&ValidationInput::Text(&record.response), hook_types);
            feedback = Some(
                results
                    .values()
                    .filter(|r| !r.outcome)
                    .map(|r| r.feedback.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
            );
        }

        Ok((false, last_response))
    }
}

/// Capability bundle every LLM-driven agent implements (spec §9 "Agent
/// polymorphism via capability set").
#[async_trait]
pub trait ReflectiveOperator: Send + Sync {
    fn base(&self) -> &ReflectiveOperatorBase;

    async fn execute(&self, input: Value) -> Result<(bool, Value)>;
}

pub mod knowledge;
pub mod scoring;

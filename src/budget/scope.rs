//! C4 — Budget Scope.
//!
//! A soft budget around a single reasoning step or group of steps, forming a
//! forest via `parent_scope_id` (spec §4.4). Closing a parent does not
//! auto-close children — the caller owns that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::budget::manager::BudgetManager;
use crate::cost::Cost;
use crate::providers::llm::ModelTier;

#[derive(Debug, Clone, Serialize)]
pub struct BudgetScopeSnapshot {
    pub scope_id: String,
    pub parent_scope_id: Option<String>,
    pub model_tier: ModelTier,
    pub max_tokens_allowed: Option<u64>,
    pub max_cost_allowed: Option<f64>,
    pub tokens_consumed: u64,
    pub cost_incurred: f64,
    pub active: bool,
}

pub struct BudgetScope {
    scope_id: String,
    parent_scope_id: Option<String>,
    model_tier: ModelTier,
    max_tokens_allowed: Option<u64>,
    max_cost_allowed: Option<f64>,
    auto_approve_threshold: f64,
    tokens_consumed: Mutex<u64>,
    cost_incurred: Mutex<f64>,
    active: AtomicBool,
    budget_manager: Arc<BudgetManager>,
}

impl BudgetScope {
    pub fn new(
        scope_id: impl Into<String>,
        parent_scope_id: Option<String>,
        model_tier: ModelTier,
        max_tokens_allowed: Option<u64>,
        max_cost_allowed: Option<f64>,
        budget_manager: Arc<BudgetManager>,
    ) -> Self {
        let auto_approve_threshold = budget_manager.config().budget.auto_approve_threshold;
        Self {
            scope_id: scope_id.into(),
            parent_scope_id,
            model_tier,
            max_tokens_allowed,
            max_cost_allowed,
            auto_approve_threshold,
            tokens_consumed: Mutex::new(0),
            cost_incurred: Mutex::new(0.0),
            active: AtomicBool::new(true),
            budget_manager,
        }
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn model_tier(&self) -> ModelTier {
        self.model_tier
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Creates a child scope reporting to the same Budget Manager, with this
    /// scope as its parent.
    pub fn child(
        &self,
        scope_id: impl Into<String>,
        model_tier: ModelTier,
        max_tokens_allowed: Option<u64>,
        max_cost_allowed: Option<f64>,
    ) -> BudgetScope {
        BudgetScope::new(
            scope_id,
            Some(self.scope_id.clone()),
            model_tier,
            max_tokens_allowed,
            max_cost_allowed,
            Arc::clone(&self.budget_manager),
        )
    }

    fn would_exceed_caps(&self, estimated: Cost) -> bool {
        let tokens_consumed = *self.tokens_consumed.lock().unwrap();
        let cost_incurred = *self.cost_incurred.lock().unwrap();
        if let Some(max_tokens) = self.max_tokens_allowed {
            if tokens_consumed + estimated.tokens > max_tokens {
                return true;
            }
        }
        if let Some(max_cost) = self.max_cost_allowed {
            if cost_incurred + estimated.cost > max_cost {
                return true;
            }
        }
        false
    }

    fn accrue(&self, estimated: Cost) {
        *self.tokens_consumed.lock().unwrap() += estimated.tokens;
        *self.cost_incurred.lock().unwrap() += estimated.cost;
    }

    /// Implements spec §4.4's five-step approval algorithm.
    pub async fn request_approval(&self, prompt: &str, description: &str) -> bool {
        if !self.is_active() {
            return false;
        }

        let model_id = self.budget_manager.config().model_for_tier(self.model_tier);
        let estimated = self.budget_manager.estimate(prompt, &model_id);

        if self.would_exceed_caps(estimated) {
            return false;
        }

        if estimated.cost <= self.auto_approve_threshold {
            self.accrue(estimated);
            return true;
        }

        let approved = self
            .budget_manager
            .request_approval(description, prompt, &model_id)
            .await;
        if approved {
            self.accrue(estimated);
        }
        approved
    }

    pub fn snapshot(&self) -> BudgetScopeSnapshot {
        BudgetScopeSnapshot {
            scope_id: self.scope_id.clone(),
            parent_scope_id: self.parent_scope_id.clone(),
            model_tier: self.model_tier,
            max_tokens_allowed: self.max_tokens_allowed,
            max_cost_allowed: self.max_cost_allowed,
            tokens_consumed: *self.tokens_consumed.lock().unwrap(),
            cost_incurred: *self.cost_incurred.lock().unwrap(),
            active: self.is_active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn scope(max_tokens: Option<u64>, max_cost: Option<f64>) -> BudgetScope {
        let manager = Arc::new(BudgetManager::with_always_approve(EngineConfig::default_local()));
        BudgetScope::new("root", None, ModelTier::Middle, max_tokens, max_cost, manager)
    }

    #[tokio::test]
    async fn approval_respects_token_cap() {
        let scope = scope(Some(1), None);
        let approved = scope.request_approval(&"word ".repeat(100), "desc").await;
        assert!(!approved);
        assert_eq!(scope.snapshot().tokens_consumed, 0);
    }

    #[tokio::test]
    async fn approval_accrues_within_caps() {
        let scope = scope(Some(10_000), Some(10.0));
        let approved = scope.request_approval("short prompt", "desc").await;
        assert!(approved);
        assert!(scope.snapshot().tokens_consumed > 0);
    }

    #[tokio::test]
    async fn closed_scope_rejects_further_requests() {
        let scope = scope(None, None);
        scope.close();
        let approved = scope.request_approval("short prompt", "desc").await;
        assert!(!approved);
    }

    #[tokio::test]
    async fn child_scope_tracks_parent_id() {
        let parent = scope(None, None);
        let child = parent.child("child-1", ModelTier::Small, None, None);
        assert_eq!(child.snapshot().parent_scope_id.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn closing_parent_does_not_close_child() {
        let parent = scope(None, None);
        let child = parent.child("child-1", ModelTier::Small, None, None);
        parent.close();
        assert!(child.is_active());
    }
}

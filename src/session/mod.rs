//! Orchestration session state (spec §3, §9 "Dynamic-object session state →
//! typed record with extensible map").
//!
//! Source represents `session_state` as a freeform dict threaded through
//! every sub-team call. Here it's a struct carrying the named keys as typed
//! fields, plus an `extra` map for anything else — writers go through
//! [`SessionState::record_step`] or [`SessionState::set_extra`] rather than
//! mutating fields ad hoc from outside the orchestrator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::architecture::{ArchitecturalContext, SystemType};
use crate::planning::Plan;

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningTrajectoryEntry {
    pub step: String,
    pub description: String,
    pub success: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModificationResult {
    pub modified_files: Vec<String>,
    pub files_deleted: Vec<String>,
    pub fallbacks_applied: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionState {
    pub objective: Value,
    pub project_path: String,
    pub task: String,
    pub constraints: Vec<String>,
    pub quality_gates: Vec<String>,
    pub analysis: Option<Value>,
    pub modification_plan: Option<Plan>,
    pub modification_result: Option<ModificationResult>,
    pub quality_results: Option<Value>,
    pub sre_results: Option<Value>,
    pub reasoning_trajectory: Vec<ReasoningTrajectoryEntry>,
    pub modified_files: HashMap<String, String>,
    pub unit_tests: HashMap<String, String>,
    pub knowledge_cache: HashMap<String, String>,
    pub knowledge_effectiveness: Vec<Value>,
    pub retrieved_context: String,
    pub architectural_context: Option<ArchitecturalContext>,
    pub system_type: Option<SystemType>,
    extra: HashMap<String, Value>,
}

impl SessionState {
    pub fn new(objective: Value, project_path: String, task: String, constraints: Vec<String>, quality_gates: Vec<String>) -> Self {
        Self {
            objective,
            project_path,
            task,
            constraints,
            quality_gates,
            analysis: None,
            modification_plan: None,
            modification_result: None,
            quality_results: None,
            sre_results: None,
            reasoning_trajectory: Vec::new(),
            modified_files: HashMap::new(),
            unit_tests: HashMap::new(),
            knowledge_cache: HashMap::new(),
            knowledge_effectiveness: Vec::new(),
            retrieved_context: String::new(),
            architectural_context: None,
            system_type: None,
            extra: HashMap::new(),
        }
    }

    /// Appends one reasoning-trajectory entry — the only way trajectory
    /// entries get written (`_add_reasoning_step` in the source).
    pub fn record_step(&mut self, step: impl Into<String>, description: impl Into<String>, success: Option<bool>, now: DateTime<Utc>) {
        self.reasoning_trajectory.push(ReasoningTrajectoryEntry {
            step: step.into(),
            description: description.into(),
            success,
            timestamp: now,
        });
    }

    const RECOGNIZED_EXTRA_KEYS: &'static [&'static str] = &["original_idea", "manifests"];

    /// Writes into the extensible map. Rejects keys that belong to the named
    /// fields above (those must go through their own typed setters) and
    /// keys outside the recognized extension set.
    pub fn set_extra(&mut self, key: &str, value: Value) -> Result<(), String> {
        if !Self::RECOGNIZED_EXTRA_KEYS.contains(&key) {
            return Err(format!("unrecognized session_state key: {key}"));
        }
        self.extra.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(serde_json::json!({}), "/p".to_string(), "task".to_string(), vec![], vec![])
    }

    #[test]
    fn record_step_appends_in_order() {
        let mut s = state();
        let now = Utc::now();
        s.record_step("a", "first", Some(true), now);
        s.record_step("b", "second", None, now);
        assert_eq!(s.reasoning_trajectory.len(), 2);
        assert_eq!(s.reasoning_trajectory[0].step, "a");
        assert_eq!(s.reasoning_trajectory[1].step, "b");
    }

    #[test]
    fn set_extra_rejects_unrecognized_keys() {
        let mut s = state();
        assert!(s.set_extra("random_field", Value::Null).is_err());
        assert!(s.set_extra("original_idea", Value::String("x".to_string())).is_ok());
        assert_eq!(s.get_extra("original_idea").unwrap(), &Value::String("x".to_string()));
    }
}

//! C5 — Validation Hook Registry.
//!
//! A per-operator registry of named, typed, prioritized validators (spec
//! §4.5), following the `Validator`/`ValidationError` shape of
//! `agents::contracts::validation` but generalized to a runtime-registered
//! table rather than a compile-time trait per type.

pub mod operational;
pub mod quality;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::cost::Cost;

pub use operational::{OperationalReport, OperationalValidator};
pub use quality::{QualityReport, QualityValidator};

/// The datum a hook validates. Hooks only look at the variant they expect;
/// a hook given the wrong variant fails closed.
pub enum ValidationInput<'a> {
    Text(&'a str),
    Json(&'a Value),
    Cost(Cost),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HookOutcome {
    pub outcome: bool,
    pub feedback: String,
}

impl HookOutcome {
    fn pass() -> Self {
        Self {
            outcome: true,
            feedback: String::new(),
        }
    }

    fn fail(feedback: impl Into<String>) -> Self {
        Self {
            outcome: false,
            feedback: feedback.into(),
        }
    }
}

pub type Validator = Box<dyn Fn(&ValidationInput) -> HookOutcome + Send + Sync>;

pub struct ValidationHook {
    pub hook_id: String,
    pub hook_type: String,
    pub priority: i32,
    validator: Validator,
}

impl ValidationHook {
    pub fn new(
        hook_id: impl Into<String>,
        hook_type: impl Into<String>,
        priority: i32,
        validator: Validator,
    ) -> Self {
        Self {
            hook_id: hook_id.into(),
            hook_type: hook_type.into(),
            priority,
            validator,
        }
    }
}

/// All results from one run, keyed by `hook_id`.
pub type ValidationResults = HashMap<String, HookOutcome>;

#[derive(Default)]
pub struct ValidationHookRegistry {
    hooks: HashMap<String, ValidationHook>,
}

impl ValidationHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: ValidationHook) {
        self.hooks.insert(hook.hook_id.clone(), hook);
    }

    /// Runs every hook matching `types` (or all hooks if `None`), ordered by
    /// descending priority. A run is "all-pass" iff every included hook
    /// returned true.
    pub fn run_validation_hooks(&self, input: &ValidationInput, types: Option<&[&str]>) -> ValidationResults {
        let mut ordered: Vec<&ValidationHook> = self
            .hooks
            .values()
            .filter(|h| types.map_or(true, |ts| ts.contains(&h.hook_type.as_str())))
            .collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        ordered
            .into_iter()
            .map(|hook| (hook.hook_id.clone(), (hook.validator)(input)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

pub fn all_pass(results: &ValidationResults) -> bool {
    results.values().all(|r| r.outcome)
}

/// A crude, language-agnostic syntax check: balanced brackets, and for
/// Python-like sources, function/class/`if`/`for`/`while` headers that are
/// missing a trailing colon. This stands in for a real parser (out of core
/// scope per spec §1) but is precise enough to drive the self-healing
/// scenario (spec §8 scenario 3).
pub fn syntax_hook(hook_id: impl Into<String>, priority: i32, language: &str) -> ValidationHook {
    let language = language.to_string();
    ValidationHook::new(
        hook_id,
        "syntax",
        priority,
        Box::new(move |input| {
            let ValidationInput::Text(text) = input else {
                return HookOutcome::fail("syntax hook requires text input");
            };
            if let Some(issue) = check_balanced_brackets(text) {
                return HookOutcome::fail(issue);
            }
            if language == "python" {
                if let Some(issue) = check_python_headers(text) {
                    return HookOutcome::fail(issue);
                }
            }
            HookOutcome::pass()
        }),
    )
}

fn check_balanced_brackets(text: &str) -> Option<String> {
    let mut stack = Vec::new();
    for ch in text.chars() {
        match ch {
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Some(format!("syntax error: unbalanced '{ch}'"));
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        None
    } else {
        Some("syntax error: unclosed bracket".to_string())
    }
}

fn check_python_headers(text: &str) -> Option<String> {
    const HEADERS: &[&str] = &["def ", "class ", "if ", "elif ", "else", "for ", "while ", "with ", "try", "except"];
    for line in text.lines() {
        let trimmed = line.trim_end();
        let stripped = trimmed.trim_start();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let is_header = HEADERS.iter().any(|h| stripped.starts_with(h));
        if is_header && !trimmed.ends_with(':') && !trimmed.ends_with('\\') {
            return Some(format!("syntax error: missing colon in header: {stripped}"));
        }
    }
    None
}

/// Validates JSON input has every required top-level field.
pub fn json_schema_hook(hook_id: impl Into<String>, priority: i32, required_fields: Vec<String>) -> ValidationHook {
    ValidationHook::new(
        hook_id,
        "schema",
        priority,
        Box::new(move |input| {
            let ValidationInput::Json(value) = input else {
                return HookOutcome::fail("schema hook requires JSON input");
            };
            let missing: Vec<&str> = required_fields
                .iter()
                .filter(|f| value.get(f.as_str()).is_none())
                .map(|f| f.as_str())
                .collect();
            if missing.is_empty() {
                HookOutcome::pass()
            } else {
                HookOutcome::fail(format!("missing required fields: {}", missing.join(", ")))
            }
        }),
    )
}

/// Validates a `Cost` does not exceed `max_cost`.
pub fn cost_bound_hook(hook_id: impl Into<String>, priority: i32, max_cost: f64) -> ValidationHook {
    ValidationHook::new(
        hook_id,
        "budget",
        priority,
        Box::new(move |input| {
            let ValidationInput::Cost(cost) = input else {
                return HookOutcome::fail("cost_bound hook requires Cost input");
            };
            if cost.cost <= max_cost {
                HookOutcome::pass()
            } else {
                HookOutcome::fail(format!("cost {} exceeds bound {}", cost.cost, max_cost))
            }
        }),
    )
}

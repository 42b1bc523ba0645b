//! C8 — Knowledge Application Scorer.
//!
//! Side-effect-free scoring of an agent's output text against a set of
//! expected patterns for its step type (spec §4.8). The concrete pattern
//! tables below are not present in the retrieved original source (only the
//! call sites `knowledge_scorer.create_agno_pattern_expectations(step_type)`
//! / `score_pattern_application(...)` are); they are authored here against
//! the four step-type names spec.md §4.8 enumerates.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;

#[derive(Clone)]
pub enum PatternMatcher {
    Substring(String),
    Regex(Regex),
}

impl PatternMatcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            PatternMatcher::Substring(s) => text.to_lowercase().contains(&s.to_lowercase()),
            PatternMatcher::Regex(r) => r.is_match(text),
        }
    }
}

#[derive(Clone)]
pub struct ExpectedPattern {
    pub name: String,
    pub matcher: PatternMatcher,
}

impl ExpectedPattern {
    pub fn substring(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matcher: PatternMatcher::Substring(needle.into()),
        }
    }

    pub fn regex(name: impl Into<String>, pattern: &str) -> Self {
        Self {
            name: name.into(),
            matcher: PatternMatcher::Regex(Regex::new(pattern).expect("static pattern is valid regex")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoringResult {
    pub overall_score: f64,
    pub pattern_scores: HashMap<String, f64>,
    pub missing_patterns: Vec<String>,
    pub feedback: Vec<String>,
}

/// Scores `output` against `expected`. An empty expectation set scores 1.0
/// (nothing was required, nothing is missing).
pub fn score_pattern_application(output: &str, expected: &[ExpectedPattern]) -> ScoringResult {
    if expected.is_empty() {
        return ScoringResult {
            overall_score: 1.0,
            pattern_scores: HashMap::new(),
            missing_patterns: Vec::new(),
            feedback: Vec::new(),
        };
    }

    let mut pattern_scores = HashMap::new();
    let mut missing_patterns = Vec::new();
    let mut feedback = Vec::new();
    let mut matched = 0;

    for pattern in expected {
        let hit = pattern.matcher.matches(output);
        pattern_scores.insert(pattern.name.clone(), if hit { 1.0 } else { 0.0 });
        if hit {
            matched += 1;
        } else {
            missing_patterns.push(pattern.name.clone());
            feedback.push(format!("expected pattern '{}' not found in output", pattern.name));
        }
    }

    ScoringResult {
        overall_score: matched as f64 / expected.len() as f64,
        pattern_scores,
        missing_patterns,
        feedback,
    }
}

/// Default pattern expectations per step type, used when the caller does
/// not supply its own (spec §4.8 names: `code_generation`, `planning`,
/// `multi_agent`, `general`).
pub fn default_patterns_for_step_type(step_type: &str) -> Vec<ExpectedPattern> {
    match step_type {
        "code_generation" => vec![
            ExpectedPattern::regex("function_definition", r"(?m)^\s*(fn|def|function)\s+\w+"),
            ExpectedPattern::substring("return_statement", "return"),
            ExpectedPattern::regex("error_handling", r"(?i)\b(result<|try:|except\b|error)"),
        ],
        "planning" => vec![
            ExpectedPattern::regex("file_reference", r"\.\w{1,5}\b"),
            ExpectedPattern::regex("action_verb", r"(?i)\b(create|modify|delete|add|update)\b"),
            ExpectedPattern::regex("ordered_steps", r"(?m)^\s*\d+[.)]\s"),
        ],
        "multi_agent" => vec![
            ExpectedPattern::regex("delegation", r"(?i)\b(delegate|hand\s?off|assign)\b"),
            ExpectedPattern::regex("coordination", r"(?i)\bcoordinat\w*"),
            ExpectedPattern::regex("role_assignment", r"(?i)\b(agent|team)\b"),
        ],
        _ => vec![
            ExpectedPattern::substring("non_empty", ""),
            ExpectedPattern::regex("actionable_detail", r"(?i)\b(should|will|must)\b"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expectations_score_full_marks() {
        let result = score_pattern_application("anything", &[]);
        assert_eq!(result.overall_score, 1.0);
        assert!(result.missing_patterns.is_empty());
    }

    #[test]
    fn code_generation_patterns_detect_missing_error_handling() {
        let patterns = default_patterns_for_step_type("code_generation");
        let result = score_pattern_application("fn add(a, b) { return a + b }", &patterns);
        assert!(result.missing_patterns.contains(&"error_handling".to_string()));
        assert!(result.overall_score < 1.0);
        assert!(result.overall_score > 0.0);
    }

    #[test]
    fn planning_patterns_all_match() {
        let patterns = default_patterns_for_step_type("planning");
        let output = "1. create main.py\n2. update config.toml\n";
        let result = score_pattern_application(output, &patterns);
        assert_eq!(result.overall_score, 1.0);
    }

    #[test]
    fn unknown_step_type_uses_general_patterns() {
        let patterns = default_patterns_for_step_type("nonsense");
        let result = score_pattern_application("this should work", &patterns);
        assert!(result.pattern_scores.contains_key("actionable_detail"));
    }
}

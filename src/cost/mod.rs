//! C1 — Token/Cost Estimator.
//!
//! Counts tokens and converts them to cost via a per-model price table,
//! falling back to a heuristic (~1 token per 4 characters) when no
//! tokenizer is available, and to a default price when the model is unknown
//! (spec §4.1, §8 "Cost table missing a model").

use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// A non-negative (tokens, cost) pair. Forms an additive monoid with zero
/// identity (spec §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub tokens: u64,
    pub cost: f64,
}

impl Cost {
    pub const ZERO: Cost = Cost { tokens: 0, cost: 0.0 };

    pub fn new(tokens: u64, cost: f64) -> Self {
        Self { tokens, cost }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost {
            tokens: self.tokens + rhs.tokens,
            cost: self.cost + rhs.cost,
        }
    }
}

impl std::iter::Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Self {
        iter.fold(Cost::ZERO, Add::add)
    }
}

/// Counts tokens in `text`. No real tokenizer is wired up (that's
/// provider-specific and out of core scope); the heuristic of one token per
/// four characters is used uniformly, matching the source's documented
/// fallback (spec §4.1).
pub fn count_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    ((text.chars().count() as f64) / 4.0).ceil() as u64
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Estimates tokens and cost for `text` against `model_id`, using
/// `config`'s price table with its documented default price for unknown
/// models. Never panics or errors — an unknown model is not a failure mode.
pub fn estimate(text: &str, model_id: &str, config: &EngineConfig) -> Cost {
    let tokens = count_tokens(text);
    let price_per_1k = config.price_for_model(model_id);
    let cost = round6((tokens as f64 / 1000.0) * price_per_1k);
    Cost::new(tokens, cost)
}

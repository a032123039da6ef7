//! Generation failure classification and the budget reduction ladder.
//!
//! Only context-length and payload-limit failures are worth retrying with a
//! smaller prompt. Rate limits are recognised so callers can report them,
//! but backing off is left to whoever drives the orchestrator.

use crate::budget::{ContextBudget, validate_budget};
use serde::{Deserialize, Serialize};
use std::fmt;

const CONTEXT_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "maximum context",
    "context window",
    "too many tokens",
    "input too long",
];
const PAYLOAD_PATTERNS: &[&str] = &["413", "payload too large", "request entity too large"];
const RATE_LIMIT_PATTERNS: &[&str] = &["429", "rate limit", "too many requests"];

/// Category of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The prompt exceeded the model's context window.
    ContextLength,
    /// The request body was rejected as too large.
    PayloadLimit,
    /// The backend throttled the request.
    RateLimit,
    /// Anything else.
    Unknown,
}

impl ErrorClass {
    /// Returns true if a smaller prompt may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::ContextLength | Self::PayloadLimit)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContextLength => "context_length",
            Self::PayloadLimit => "payload_limit",
            Self::RateLimit => "rate_limit",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a backend error message by case-insensitive substring match.
///
/// Context-window phrases win over payload codes, which win over rate
/// limits.
#[must_use]
pub fn classify_generation_error(message: &str) -> ErrorClass {
    let msg = message.to_lowercase();
    let matches_any = |patterns: &[&str]| patterns.iter().any(|p| msg.contains(p));

    if matches_any(CONTEXT_PATTERNS) {
        ErrorClass::ContextLength
    } else if matches_any(PAYLOAD_PATTERNS) {
        ErrorClass::PayloadLimit
    } else if matches_any(RATE_LIMIT_PATTERNS) {
        ErrorClass::RateLimit
    } else {
        ErrorClass::Unknown
    }
}

fn scale(value: usize, ratio: f64) -> usize {
    if value == 0 {
        0
    } else {
        ((value as f64 * ratio).floor() as usize).max(1)
    }
}

/// Budget for retry number `step` (0-based).
///
/// Returns `None` once the ladder is exhausted or when the step's ratio is
/// outside `(0, 1)`, so the sequence of budgets can only shrink. The
/// decision is validated again on the scaled values with `compaction_factor`.
#[must_use]
pub fn next_retry_budget(
    previous: &ContextBudget,
    step: usize,
    reduction_steps: &[f64],
    compaction_factor: f64,
) -> Option<ContextBudget> {
    let ratio = *reduction_steps.get(step)?;
    if !(ratio > 0.0 && ratio < 1.0) {
        return None;
    }

    let mut next = ContextBudget {
        max_context_tokens: scale(previous.max_context_tokens, ratio),
        estimated_prompt_tokens: scale(previous.estimated_prompt_tokens, ratio),
        available_tokens: scale(previous.available_tokens, ratio),
        component_estimates: previous
            .component_estimates
            .iter()
            .map(|(name, tokens)| (name.clone(), scale(*tokens, ratio)))
            .collect(),
        ..previous.clone()
    };
    next.decision = validate_budget(&next, compaction_factor);
    Some(next)
}

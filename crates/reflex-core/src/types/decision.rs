//! Decision types - the cascade's output for one utterance.

use serde::{Deserialize, Serialize};

use super::pattern::CachedResponse;

/// The stage that produced the terminal decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stage 0: structural/policy validation.
    Validation,
    /// Stage 1a: lexical matching.
    Lexical,
    /// Stage 1b: semantic matching.
    Semantic,
    /// Stage 2: generative fallback.
    Fallback,
}

impl Stage {
    /// Short label used in telemetry ("0", "1a", "1b", "2").
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "0",
            Stage::Lexical => "1a",
            Stage::Semantic => "1b",
            Stage::Fallback => "2",
        }
    }
}

/// The matching technique that produced the terminal decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ValidationReject,
    Exact,
    Fuzzy,
    Embedding,
    Fallback,
    /// Tenant excluded from rollout or cascade disabled; routed straight to
    /// the fallback provider.
    Disabled,
}

/// Why Stage 0 rejected the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooShort,
    TooLong,
    Blocked,
    RateLimited,
}

impl RejectReason {
    /// The zero-cost canned clarification prompt for this rejection.
    pub fn canned_response(&self) -> &'static str {
        match self {
            RejectReason::TooShort => "I didn't catch that. Could you say a bit more?",
            RejectReason::TooLong => {
                "That was a lot at once. Could you break it into smaller questions?"
            }
            RejectReason::Blocked => "I can't help with that. Is there something else I can do?",
            RejectReason::RateLimited => "One moment please, let me catch up.",
        }
    }
}

/// Terminal outcome of the cascade for one utterance.
///
/// A closed tagged variant: each arm carries only the fields relevant to
/// that outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Stage 0 rejected the utterance; `response` is a canned prompt.
    Reject {
        reason: RejectReason,
        response: String,
    },
    /// A cached pattern answered the utterance.
    Hit {
        pattern_id: String,
        pattern_key: String,
        response: CachedResponse,
        score: f32,
    },
    /// The generative fallback produced the answer.
    Escalate { response: String, confidence: f32 },
}

/// The cascade's decision record for one utterance. Not persisted;
/// constructed fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Terminal outcome.
    pub outcome: Outcome,
    /// Stage that terminated the cascade.
    pub stage: Stage,
    /// Matching technique used.
    pub method: MatchMethod,
    /// Similarity or confidence value driving the decision, kept for audit
    /// and threshold tuning.
    pub match_score: Option<f32>,
    /// Wall-clock time spent in the cascade.
    pub latency_ms: f64,
    /// Estimated provider spend avoided relative to always escalating.
    /// Observability only.
    pub cost_delta: f32,
}

impl Decision {
    /// True when the generative fallback provider was invoked for this turn.
    pub fn should_escalate(&self) -> bool {
        matches!(self.outcome, Outcome::Escalate { .. })
    }

    /// The user-facing answer text, when one exists.
    ///
    /// `None` for action-typed cached responses; callers execute the action
    /// instead of speaking a reply.
    pub fn response_text(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Reject { response, .. } => Some(response),
            Outcome::Hit { response, .. } => response.as_text(),
            Outcome::Escalate { response, .. } => Some(response),
        }
    }
}

//! Stage 0: structural/policy validation.
//!
//! Synchronous and allocation-light; must complete well under a millisecond
//! and never touch the network. The only side effect is rate-limiter state.

use std::time::Instant;

use dashmap::DashMap;

use crate::config::CascadeConfig;
use crate::types::RejectReason;

/// Buckets are pruned once the map grows past this many sessions.
const PRUNE_THRESHOLD: usize = 4096;
/// A bucket idle this long is eligible for pruning.
const IDLE_SECS: u64 = 600;

/// Outcome of Stage 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Pass,
    Reject(RejectReason),
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Stage 0 validator with per-(namespace, session) token buckets.
pub struct Validator {
    buckets: DashMap<String, TokenBucket>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Validate an utterance. Checks run in order: length bounds, blocklist,
    /// rate limit. The first failure is terminal.
    pub fn validate(
        &self,
        utterance: &str,
        namespace: &str,
        session_id: &str,
        config: &CascadeConfig,
    ) -> ValidationOutcome {
        let length = utterance.chars().count();
        if length < config.min_utterance_length {
            return ValidationOutcome::Reject(RejectReason::TooShort);
        }
        if length > config.max_utterance_length {
            return ValidationOutcome::Reject(RejectReason::TooLong);
        }

        if !config.blocklist.is_empty() {
            let lowered = utterance.to_lowercase();
            if config
                .blocklist
                .iter()
                .any(|blocked| !blocked.is_empty() && lowered.contains(&blocked.to_lowercase()))
            {
                return ValidationOutcome::Reject(RejectReason::Blocked);
            }
        }

        if !self.take_token(namespace, session_id, config) {
            return ValidationOutcome::Reject(RejectReason::RateLimited);
        }

        ValidationOutcome::Pass
    }

    /// Token-bucket check for one session. Returns false when exhausted.
    fn take_token(&self, namespace: &str, session_id: &str, config: &CascadeConfig) -> bool {
        let capacity = f64::from(config.rate_limit.capacity);
        let refill = config.rate_limit.refill_per_sec;
        let key = format!("{namespace}:{session_id}");
        let now = Instant::now();

        let allowed = {
            let mut bucket = self.buckets.entry(key).or_insert_with(|| TokenBucket {
                tokens: capacity,
                last_refill: now,
            });

            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * refill).min(capacity);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                true
            } else {
                false
            }
        };

        if self.buckets.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        allowed
    }

    fn prune(&self, now: Instant) {
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill).as_secs() < IDLE_SECS);
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

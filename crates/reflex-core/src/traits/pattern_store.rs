//! Pattern store trait.
//!
//! A typed interface to the persistent, namespaced pattern corpus. The store
//! carries no business logic: deactivation policy lives in the learning
//! controller, which reads the counters this trait returns.

use async_trait::async_trait;

use crate::error::ReflexResult;
use crate::types::Pattern;

/// Counters after a success-rate update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuccessRateUpdate {
    /// New all-time success ratio in [0, 1].
    pub success_rate: f32,
    /// Total feedback observations after the update.
    pub sample_count: u64,
}

/// Trait for pattern storage operations.
///
/// All read paths are namespace-scoped; implementations must never return a
/// pattern outside the requested namespace. Counter updates must be atomic
/// with respect to concurrent calls on the same pattern.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// All active patterns in a namespace, in creation order.
    async fn get_active_patterns(&self, namespace: &str) -> ReflexResult<Vec<Pattern>>;

    /// Point read for admin/audit, active or not.
    async fn get_pattern(&self, id: &str) -> ReflexResult<Option<Pattern>>;

    /// Persist a new pattern. Fails with a conflict error when the
    /// (namespace, key) pair already exists.
    async fn create_pattern(&self, pattern: &Pattern) -> ReflexResult<String>;

    /// Record one successful match. Commutative; concurrent increments must
    /// not lose updates.
    async fn increment_hit_count(&self, id: &str) -> ReflexResult<()>;

    /// Record one feedback observation and return the new counters.
    async fn update_success_rate(&self, id: &str, success: bool)
        -> ReflexResult<SuccessRateUpdate>;

    /// Append an additional example phrasing to an existing pattern.
    async fn append_example_query(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
    ) -> ReflexResult<()>;

    /// Exclude a pattern from matching while retaining it for audit.
    async fn deactivate(&self, id: &str) -> ReflexResult<()>;

    /// Hard delete. Explicit administrative action only.
    async fn delete(&self, id: &str) -> ReflexResult<()>;
}

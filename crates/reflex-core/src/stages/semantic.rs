//! Stage 1b: semantic matching.
//!
//! One bounded embedding call per invocation, then a cosine scan over every
//! example vector of every active pattern in the namespace. An embedding
//! failure or timeout is reported as `ProviderUnavailable` and treated by
//! the cascade as a miss (fail-open); this stage never fails the request.

use std::sync::Arc;
use std::time::Duration;

use crate::index::{IndexedPattern, NamespaceIndex};
use crate::stages::lexical::beats;
use crate::traits::Embedder;

/// A semantic hit.
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub pattern: Arc<IndexedPattern>,
    pub score: f32,
}

/// Outcome of Stage 1b.
#[derive(Debug, Clone)]
pub enum SemanticOutcome {
    Hit(SemanticMatch),
    Miss,
    /// Embedding provider failed or timed out; the cascade proceeds.
    ProviderUnavailable,
}

/// Match an utterance against the namespace snapshot's example vectors.
pub async fn match_semantic(
    utterance: &str,
    index: &NamespaceIndex,
    embedder: &dyn Embedder,
    threshold: f32,
    timeout: Duration,
) -> SemanticOutcome {
    if index.is_empty() {
        return SemanticOutcome::Miss;
    }

    let query = match tokio::time::timeout(timeout, embedder.embed(utterance)).await {
        Ok(Ok(vector)) => vector,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "embedding call failed, falling through");
            return SemanticOutcome::ProviderUnavailable;
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "embedding call timed out");
            return SemanticOutcome::ProviderUnavailable;
        }
    };

    let mut best: Option<(Arc<IndexedPattern>, f32)> = None;
    for entry in index.patterns() {
        let mut score = f32::MIN;
        for example in &entry.pattern.example_queries {
            if example.embedding.len() != query.len() {
                continue;
            }
            score = score.max(cosine_similarity(&query, &example.embedding));
        }
        if score < threshold {
            continue;
        }
        let replace = match &best {
            None => true,
            Some((incumbent, incumbent_score)) => beats(entry, score, incumbent, *incumbent_score),
        };
        if replace {
            best = Some((entry.clone(), score));
        }
    }

    match best {
        Some((pattern, score)) => SemanticOutcome::Hit(SemanticMatch { pattern, score }),
        None => SemanticOutcome::Miss,
    }
}

/// Normalized dot-product similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

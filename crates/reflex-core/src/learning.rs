//! Stage 2: escalation and online learning.
//!
//! The escalation controller invokes the generative fallback and, when the
//! reported confidence clears the learning threshold, submits a
//! [`LearnRequest`] to a detached worker over a bounded queue. Pattern
//! writes therefore never add latency to the conversational turn that
//! triggered them: a full queue drops the request with a warning, and a
//! failed write is logged by the worker, not surfaced to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::CascadeConfig;
use crate::error::{ErrorCode, ReflexError, ReflexResult};
use crate::index::{normalize_text, PatternIndex};
use crate::traits::{
    Embedder, FallbackClient, FallbackResponse, PatternStore, SuccessRateUpdate,
};
use crate::types::{CachedResponse, ExampleQuery, Pattern, TurnContext};

/// Default learning queue depth.
const QUEUE_CAPACITY: usize = 256;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do",
        "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "is", "it", "its",
        "may", "me", "might", "my", "no", "not", "of", "on", "or", "our", "please", "shall",
        "should", "so", "than", "that", "the", "their", "them", "then", "there", "these",
        "they", "this", "those", "to", "up", "us", "was", "we", "were", "what", "when",
        "where", "which", "who", "whom", "why", "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Pluggable pattern-key inference strategy.
pub trait KeyInference: Send + Sync {
    /// Infer a stable intent key from free text (e.g. "business_hours").
    fn infer_key(&self, utterance: &str) -> String;
}

/// Default heuristic: normalize, drop stopwords, join the first three
/// remaining tokens with underscores. "What are your hours?" → "hours".
pub struct HeuristicKeyInference;

impl HeuristicKeyInference {
    /// Content tokens of an utterance (normalized, stopwords removed).
    pub fn content_tokens(utterance: &str) -> Vec<String> {
        normalize_text(utterance)
            .split_whitespace()
            .filter(|token| !STOPWORDS.contains(token))
            .map(|token| token.to_string())
            .collect()
    }
}

impl KeyInference for HeuristicKeyInference {
    fn infer_key(&self, utterance: &str) -> String {
        let tokens = Self::content_tokens(utterance);
        if tokens.is_empty() {
            return "general_inquiry".to_string();
        }
        tokens
            .iter()
            .take(3)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// A deferred pattern write.
#[derive(Debug, Clone)]
pub struct LearnRequest {
    pub namespace: String,
    pub utterance: String,
    pub response_text: String,
    pub confidence: f32,
}

/// Non-blocking submission side of the learning queue.
#[derive(Clone)]
pub struct LearningQueue {
    tx: mpsc::Sender<LearnRequest>,
}

impl LearningQueue {
    /// Enqueue a learn request without waiting. A full or closed queue
    /// drops the request; learning is best-effort by design.
    pub fn submit(&self, request: LearnRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    namespace = %dropped.namespace,
                    "learning queue full, dropping pattern write"
                );
            }
            Err(TrySendError::Closed(dropped)) => {
                tracing::warn!(
                    namespace = %dropped.namespace,
                    "learning worker gone, dropping pattern write"
                );
            }
        }
    }
}

/// Detached worker that applies learn requests to the store and index.
///
/// The host spawns `run()` on its runtime; dropping every [`LearningQueue`]
/// shuts the worker down once the queue drains.
pub struct LearningWorker {
    rx: mpsc::Receiver<LearnRequest>,
    store: Arc<dyn PatternStore>,
    index: Arc<PatternIndex>,
    embedder: Arc<dyn Embedder>,
    keys: Arc<dyn KeyInference>,
}

impl LearningWorker {
    /// Create a queue/worker pair with the default queue depth.
    pub fn new(
        store: Arc<dyn PatternStore>,
        index: Arc<PatternIndex>,
        embedder: Arc<dyn Embedder>,
        keys: Arc<dyn KeyInference>,
    ) -> (LearningQueue, Self) {
        Self::with_capacity(store, index, embedder, keys, QUEUE_CAPACITY)
    }

    /// Create a queue/worker pair with a custom queue depth.
    pub fn with_capacity(
        store: Arc<dyn PatternStore>,
        index: Arc<PatternIndex>,
        embedder: Arc<dyn Embedder>,
        keys: Arc<dyn KeyInference>,
        capacity: usize,
    ) -> (LearningQueue, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            LearningQueue { tx },
            Self {
                rx,
                store,
                index,
                embedder,
                keys,
            },
        )
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            let namespace = request.namespace.clone();
            if let Err(e) = self.apply(request).await {
                tracing::warn!(namespace = %namespace, error = %e, "pattern write failed");
            }
        }
    }

    /// Apply one learn request: create a new pattern, or on key collision
    /// append the utterance as a further example and reinforce the pattern.
    pub async fn apply(&self, request: LearnRequest) -> ReflexResult<()> {
        let key = self.keys.infer_key(&request.utterance);
        let snapshot = self.index.snapshot(&request.namespace).await;

        if let Some(existing) = snapshot.find_by_key(&key) {
            let id = existing.pattern.id.clone();
            let already_known = existing
                .pattern
                .example_queries
                .iter()
                .any(|e| e.text == request.utterance);
            if already_known {
                // Same phrasing seen again; reinforce without growing the
                // example set.
                self.store.update_success_rate(&id, true).await?;
                return Ok(());
            }

            let embedding = self.embedder.embed(&request.utterance).await?;
            self.store
                .append_example_query(&id, &request.utterance, &embedding)
                .await?;
            self.store.update_success_rate(&id, true).await?;
            self.index.append_example(
                &request.namespace,
                &id,
                ExampleQuery::new(request.utterance.clone(), embedding),
            );
            tracing::debug!(namespace = %request.namespace, key = %key, "reinforced existing pattern");
            return Ok(());
        }

        let embedding = self.embedder.embed(&request.utterance).await?;
        let keywords: Vec<String> = key.split('_').map(str::to_string).collect();
        let pattern = Pattern::new(&request.namespace, &key, CachedResponse::text(&request.response_text))
            .with_keywords(keywords)
            .with_examples(vec![ExampleQuery::new(&request.utterance, embedding)])
            .with_confidence(request.confidence);

        match self.store.create_pattern(&pattern).await {
            Ok(_) => {
                tracing::debug!(namespace = %request.namespace, key = %key, "learned new pattern");
                self.index.insert_pattern(pattern);
                Ok(())
            }
            // Lost a create race for the same key; the winner's pattern
            // will absorb future reinforcement.
            Err(ReflexError::Store { code, .. }) if code == ErrorCode::StoreConflict => {
                tracing::debug!(namespace = %request.namespace, key = %key, "pattern create raced, skipping");
                self.index.invalidate(&request.namespace);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Stage 2 controller: always produces a response or propagates the
/// fallback's failure, since there is no further fallback behind it.
pub struct EscalationController {
    fallback: Arc<dyn FallbackClient>,
    queue: LearningQueue,
}

impl EscalationController {
    pub fn new(fallback: Arc<dyn FallbackClient>, queue: LearningQueue) -> Self {
        Self { fallback, queue }
    }

    /// Invoke the fallback provider. When `learn` is set and the reported
    /// confidence clears the threshold, a pattern write is queued; the
    /// response returns to the caller without waiting for it.
    pub async fn escalate(
        &self,
        utterance: &str,
        context: &TurnContext,
        config: &CascadeConfig,
        learn: bool,
    ) -> ReflexResult<FallbackResponse> {
        let response = self.fallback.respond(utterance, &context.history).await?;

        if learn && response.confidence >= config.learning_confidence_threshold {
            self.queue.submit(LearnRequest {
                namespace: context.namespace.clone(),
                utterance: utterance.to_string(),
                response_text: response.text.clone(),
                confidence: response.confidence,
            });
        }

        Ok(response)
    }
}

/// Record explicit or inferred feedback for a pattern and auto-deactivate
/// it once its success rate falls below the configured floor with enough
/// samples.
pub async fn record_feedback(
    store: &dyn PatternStore,
    index: &PatternIndex,
    namespace: &str,
    pattern_id: &str,
    success: bool,
    config: &CascadeConfig,
) -> ReflexResult<SuccessRateUpdate> {
    let update = store.update_success_rate(pattern_id, success).await?;

    if update.sample_count >= config.deactivation_min_samples
        && update.success_rate < config.deactivation_success_floor
    {
        store.deactivate(pattern_id).await?;
        index.remove_pattern(namespace, pattern_id);
        tracing::info!(
            namespace,
            pattern_id,
            success_rate = update.success_rate,
            samples = update.sample_count,
            "pattern auto-deactivated"
        );
    }

    Ok(update)
}

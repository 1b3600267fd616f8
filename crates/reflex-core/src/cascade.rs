//! The decision cascade orchestrator.
//!
//! Sequences Stage 0 → 1a → 1b → 2 over a single request, short-circuiting
//! on the first confident match. Pure orchestration: the only state it
//! touches is the active-pattern snapshot obtained once per request, so no
//! stage is ever re-entered and there are no backward transitions.
//!
//! Degradation is structural rather than exceptional: a store read failure
//! yields an empty snapshot, an embedding failure or timeout is a Stage 1b
//! miss, and both roads lead to Stage 2. The only error `decide` can return
//! is the fallback provider's own failure, which has nothing behind it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CascadeConfig;
use crate::error::ReflexResult;
use crate::index::{IndexStats, IndexedPattern, PatternIndex};
use crate::learning::{
    record_feedback, EscalationController, HeuristicKeyInference, KeyInference, LearningWorker,
};
use crate::registry::CascadeRegistry;
use crate::rollout::RolloutController;
use crate::stages::{
    match_lexical, match_semantic, SemanticOutcome, ValidationOutcome, Validator,
};
use crate::telemetry::{DecisionEvent, DecisionSink, TracingSink};
use crate::traits::{Embedder, FallbackClient, PatternStore, SuccessRateUpdate};
use crate::types::{Decision, MatchMethod, Outcome, Stage, TurnContext};

/// The four-stage decision cascade.
pub struct DecisionCascade {
    registry: Arc<CascadeRegistry>,
    store: Arc<dyn PatternStore>,
    index: Arc<PatternIndex>,
    embedder: Arc<dyn Embedder>,
    escalation: EscalationController,
    validator: Validator,
    rollout: RolloutController,
    sink: Arc<dyn DecisionSink>,
}

impl DecisionCascade {
    /// Create a cascade and its learning worker. The host owns the worker:
    /// spawn `worker.run()` on the runtime, or drop it to disable learning.
    pub fn new(
        registry: Arc<CascadeRegistry>,
        store: Arc<dyn PatternStore>,
        embedder: Arc<dyn Embedder>,
        fallback: Arc<dyn FallbackClient>,
    ) -> (Self, LearningWorker) {
        Self::with_key_inference(
            registry,
            store,
            embedder,
            fallback,
            Arc::new(HeuristicKeyInference),
        )
    }

    /// Create a cascade with a custom key-inference strategy.
    pub fn with_key_inference(
        registry: Arc<CascadeRegistry>,
        store: Arc<dyn PatternStore>,
        embedder: Arc<dyn Embedder>,
        fallback: Arc<dyn FallbackClient>,
        keys: Arc<dyn KeyInference>,
    ) -> (Self, LearningWorker) {
        let index = Arc::new(PatternIndex::new(store.clone()));
        let (queue, worker) =
            LearningWorker::new(store.clone(), index.clone(), embedder.clone(), keys);

        let cascade = Self {
            registry,
            store,
            index,
            embedder,
            escalation: EscalationController::new(fallback, queue),
            validator: Validator::new(),
            rollout: RolloutController::new(),
            sink: Arc::new(TracingSink),
        };
        (cascade, worker)
    }

    /// Replace the telemetry sink.
    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Decide one utterance.
    pub async fn decide(&self, utterance: &str, ctx: &TurnContext) -> ReflexResult<Decision> {
        let start = Instant::now();
        let config = self.registry.config(&ctx.namespace);

        // Emergency disable and rollout exclusion route straight to the
        // fallback; no matching, no learning.
        if !config.enabled
            || !self
                .rollout
                .participates(&ctx.namespace, &ctx.session_id, &config.rollout)
        {
            let response = self.escalation.escalate(utterance, ctx, &config, false).await?;
            return Ok(self.finish(
                ctx,
                Decision {
                    outcome: Outcome::Escalate {
                        response: response.text,
                        confidence: response.confidence,
                    },
                    stage: Stage::Fallback,
                    method: MatchMethod::Disabled,
                    match_score: None,
                    latency_ms: 0.0,
                    cost_delta: 0.0,
                },
                start,
            ));
        }

        // Stage 0: structural/policy validation. Terminal on rejection,
        // zero cost, no provider is ever touched.
        if let ValidationOutcome::Reject(reason) =
            self.validator
                .validate(utterance, &ctx.namespace, &ctx.session_id, &config)
        {
            return Ok(self.finish(
                ctx,
                Decision {
                    outcome: Outcome::Reject {
                        reason,
                        response: reason.canned_response().to_string(),
                    },
                    stage: Stage::Validation,
                    method: MatchMethod::ValidationReject,
                    match_score: None,
                    latency_ms: 0.0,
                    cost_delta: config.fallback_cost_estimate,
                },
                start,
            ));
        }

        let snapshot = self.index.snapshot(&ctx.namespace).await;

        // Stage 1a: lexical. In-memory, cannot error.
        if let Some(hit) = match_lexical(utterance, &snapshot, config.fuzzy_threshold) {
            self.record_hit(&hit.pattern);
            return Ok(self.finish(
                ctx,
                Decision {
                    outcome: Outcome::Hit {
                        pattern_id: hit.pattern.pattern.id.clone(),
                        pattern_key: hit.pattern.pattern.key.clone(),
                        response: hit.pattern.pattern.cached_response.clone(),
                        score: hit.score,
                    },
                    stage: Stage::Lexical,
                    method: hit.method,
                    match_score: Some(hit.score),
                    latency_ms: 0.0,
                    cost_delta: config.fallback_cost_estimate,
                },
                start,
            ));
        }

        // Stage 1b: semantic. Provider failure behaves exactly like a miss.
        let mut embedding_spent = 0.0;
        match match_semantic(
            utterance,
            &snapshot,
            self.embedder.as_ref(),
            config.semantic_threshold,
            Duration::from_millis(config.embed_timeout_ms),
        )
        .await
        {
            SemanticOutcome::Hit(hit) => {
                self.record_hit(&hit.pattern);
                return Ok(self.finish(
                    ctx,
                    Decision {
                        outcome: Outcome::Hit {
                            pattern_id: hit.pattern.pattern.id.clone(),
                            pattern_key: hit.pattern.pattern.key.clone(),
                            response: hit.pattern.pattern.cached_response.clone(),
                            score: hit.score,
                        },
                        stage: Stage::Semantic,
                        method: MatchMethod::Embedding,
                        match_score: Some(hit.score),
                        latency_ms: 0.0,
                        cost_delta: config.fallback_cost_estimate
                            - config.embedding_cost_estimate,
                    },
                    start,
                ));
            }
            SemanticOutcome::Miss => {
                if !snapshot.is_empty() {
                    embedding_spent = config.embedding_cost_estimate;
                }
            }
            SemanticOutcome::ProviderUnavailable => {}
        }

        // Stage 2: the last resort. Always produces a response or
        // propagates the provider's failure to the caller.
        let response = self.escalation.escalate(utterance, ctx, &config, true).await?;
        Ok(self.finish(
            ctx,
            Decision {
                outcome: Outcome::Escalate {
                    response: response.text,
                    confidence: response.confidence,
                },
                stage: Stage::Fallback,
                method: MatchMethod::Fallback,
                match_score: Some(response.confidence),
                latency_ms: 0.0,
                cost_delta: -embedding_spent,
            },
            start,
        ))
    }

    /// Record explicit or inferred feedback for a served pattern.
    /// Auto-deactivation applies per the tenant's config.
    pub async fn record_feedback(
        &self,
        namespace: &str,
        pattern_id: &str,
        success: bool,
    ) -> ReflexResult<SuccessRateUpdate> {
        let config = self.registry.config(namespace);
        record_feedback(
            self.store.as_ref(),
            &self.index,
            namespace,
            pattern_id,
            success,
            &config,
        )
        .await
    }

    /// Drop a namespace snapshot so the next request reloads from the
    /// store. Call after out-of-band pattern administration.
    pub fn invalidate(&self, namespace: &str) {
        self.index.invalidate(namespace);
    }

    /// Per-namespace counters, if the namespace is loaded.
    pub fn stats(&self, namespace: &str) -> Option<IndexStats> {
        self.index.stats(namespace)
    }

    /// The shared pattern index (bootstrap and admin paths).
    pub fn index(&self) -> &Arc<PatternIndex> {
        &self.index
    }

    /// Bump the live counter and persist the hit without holding up the
    /// turn.
    fn record_hit(&self, entry: &Arc<IndexedPattern>) {
        entry.record_hit();
        let store = self.store.clone();
        let id = entry.pattern.id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.increment_hit_count(&id).await {
                tracing::warn!(pattern_id = %id, error = %e, "hit count persistence failed");
            }
        });
    }

    fn finish(&self, ctx: &TurnContext, mut decision: Decision, start: Instant) -> Decision {
        decision.latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.sink.record(&DecisionEvent {
            namespace: ctx.namespace.clone(),
            stage: decision.stage,
            method: decision.method,
            match_score: decision.match_score,
            latency_ms: decision.latency_ms,
            cost_delta: decision.cost_delta,
        });
        decision
    }
}

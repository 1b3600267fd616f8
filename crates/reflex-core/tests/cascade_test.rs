//! End-to-end tests for the decision cascade with deterministic fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reflex_core::{
    CachedResponse, CascadeConfig, CascadeRegistry, DecisionCascade, Embedder, ExampleQuery,
    FallbackClient, FallbackResponse, MatchMethod, Message, Outcome, Pattern, PatternStore,
    ReflexError, ReflexResult, Stage, SuccessRateUpdate, TurnContext,
};

/// In-memory pattern store preserving creation order.
#[derive(Default)]
struct MemoryStore {
    patterns: Mutex<Vec<Pattern>>,
}

impl MemoryStore {
    fn with_patterns(patterns: Vec<Pattern>) -> Self {
        Self {
            patterns: Mutex::new(patterns),
        }
    }

    fn hit_count(&self, id: &str) -> Option<u64> {
        self.patterns
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.hit_count)
    }
}

#[async_trait]
impl PatternStore for MemoryStore {
    async fn get_active_patterns(&self, namespace: &str) -> ReflexResult<Vec<Pattern>> {
        Ok(self
            .patterns
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.namespace == namespace && p.is_active)
            .cloned()
            .collect())
    }

    async fn get_pattern(&self, id: &str) -> ReflexResult<Option<Pattern>> {
        Ok(self
            .patterns
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn create_pattern(&self, pattern: &Pattern) -> ReflexResult<String> {
        let mut patterns = self.patterns.lock().unwrap();
        if patterns
            .iter()
            .any(|p| p.namespace == pattern.namespace && p.key == pattern.key)
        {
            return Err(ReflexError::store_conflict(format!(
                "pattern key '{}' exists in namespace '{}'",
                pattern.key, pattern.namespace
            )));
        }
        patterns.push(pattern.clone());
        Ok(pattern.id.clone())
    }

    async fn increment_hit_count(&self, id: &str) -> ReflexResult<()> {
        let mut patterns = self.patterns.lock().unwrap();
        let pattern = patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ReflexError::not_found(id))?;
        pattern.hit_count += 1;
        Ok(())
    }

    async fn update_success_rate(
        &self,
        id: &str,
        success: bool,
    ) -> ReflexResult<SuccessRateUpdate> {
        let mut patterns = self.patterns.lock().unwrap();
        let pattern = patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ReflexError::not_found(id))?;
        if success {
            pattern.success_count += 1;
        }
        pattern.sample_count += 1;
        Ok(SuccessRateUpdate {
            success_rate: pattern.success_rate(),
            sample_count: pattern.sample_count,
        })
    }

    async fn append_example_query(
        &self,
        id: &str,
        text: &str,
        embedding: &[f32],
    ) -> ReflexResult<()> {
        let mut patterns = self.patterns.lock().unwrap();
        let pattern = patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ReflexError::not_found(id))?;
        pattern
            .example_queries
            .push(ExampleQuery::new(text, embedding.to_vec()));
        Ok(())
    }

    async fn deactivate(&self, id: &str) -> ReflexResult<()> {
        let mut patterns = self.patterns.lock().unwrap();
        let pattern = patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ReflexError::not_found(id))?;
        pattern.is_active = false;
        Ok(())
    }

    async fn delete(&self, id: &str) -> ReflexResult<()> {
        self.patterns.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }
}

/// Embedder returning scripted vectors, counting every call.
struct ScriptedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    default: Vec<f32>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    fn new(vectors: HashMap<String, Vec<f32>>) -> Self {
        Self {
            vectors,
            default: vec![0.0, 0.0, 1.0],
            calls: AtomicUsize::new(0),
        }
    }

    fn plain() -> Self {
        Self::new(HashMap::new())
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> ReflexResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Embedder that never returns within any sane stage budget.
struct HangingEmbedder {
    calls: AtomicUsize,
}

impl HangingEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for HangingEmbedder {
    async fn embed(&self, _text: &str) -> ReflexResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "hanging"
    }
}

/// Fallback returning a fixed answer, counting every call.
struct ScriptedFallback {
    text: String,
    confidence: f32,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedFallback {
    fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FallbackClient for ScriptedFallback {
    async fn respond(
        &self,
        _utterance: &str,
        _context: &[Message],
    ) -> ReflexResult<FallbackResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ReflexError::fallback("provider outage"));
        }
        Ok(FallbackResponse {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn hours_pattern(namespace: &str) -> Pattern {
    Pattern::new(namespace, "business_hours", CachedResponse::text("We're open 9 to 5."))
        .with_keywords(vec!["hours".to_string()])
        .with_examples(vec![ExampleQuery::new(
            "What are your hours?",
            vec![1.0, 0.0, 0.0],
        )])
}

fn build_cascade(
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    fallback: Arc<ScriptedFallback>,
    config: CascadeConfig,
) -> DecisionCascade {
    let registry = Arc::new(CascadeRegistry::new(config));
    let (cascade, worker) = DecisionCascade::new(registry, store, embedder, fallback);
    tokio::spawn(worker.run());
    cascade
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn rejects_short_utterance_without_touching_providers() {
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant")]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.95));
    let cascade = build_cascade(
        store,
        embedder.clone(),
        fallback.clone(),
        CascadeConfig::default(),
    );

    let ctx = TurnContext::new("tenant", "s1");
    let decision = cascade.decide("a", &ctx).await.unwrap();

    assert_eq!(decision.stage, Stage::Validation);
    assert_eq!(decision.method, MatchMethod::ValidationReject);
    assert!(!decision.should_escalate());
    assert!(matches!(decision.outcome, Outcome::Reject { .. }));
    assert_eq!(embedder.call_count(), 0);
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn rejects_long_utterance_without_touching_providers() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.95));
    let cascade = build_cascade(
        store,
        embedder.clone(),
        fallback.clone(),
        CascadeConfig::default(),
    );

    let ctx = TurnContext::new("tenant", "s1");
    let long = "word ".repeat(200);
    let decision = cascade.decide(&long, &ctx).await.unwrap();

    assert_eq!(decision.stage, Stage::Validation);
    assert_eq!(embedder.call_count(), 0);
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn exact_keyword_hits_without_embedding() {
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant")]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.95));
    let cascade = build_cascade(
        store,
        embedder.clone(),
        fallback.clone(),
        CascadeConfig::default(),
    );

    let ctx = TurnContext::new("tenant", "s1");
    let decision = cascade.decide("What are your hours today?", &ctx).await.unwrap();

    assert_eq!(decision.stage, Stage::Lexical);
    assert_eq!(decision.method, MatchMethod::Exact);
    assert_eq!(decision.match_score, Some(1.0));
    assert!(!decision.should_escalate());
    assert_eq!(decision.response_text(), Some("We're open 9 to 5."));
    assert_eq!(embedder.call_count(), 0);
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn paraphrase_hits_semantically_above_threshold() {
    // Cosine between the utterance vector and the stored example is 0.82,
    // above the 0.75 default threshold.
    let mut vectors = HashMap::new();
    vectors.insert(
        "When do you close?".to_string(),
        vec![0.82, (1.0f32 - 0.82 * 0.82).sqrt(), 0.0],
    );
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant")]));
    let embedder = Arc::new(ScriptedEmbedder::new(vectors));
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.95));
    let cascade = build_cascade(
        store,
        embedder.clone(),
        fallback.clone(),
        CascadeConfig::default(),
    );

    let ctx = TurnContext::new("tenant", "s1");
    let decision = cascade.decide("When do you close?", &ctx).await.unwrap();

    assert_eq!(decision.stage, Stage::Semantic);
    assert_eq!(decision.method, MatchMethod::Embedding);
    let score = decision.match_score.unwrap();
    assert!(score >= 0.75, "score {score} under threshold");
    assert!((score - 0.82).abs() < 0.01);
    assert!(!decision.should_escalate());
    assert_eq!(fallback.call_count(), 0);
}

#[tokio::test]
async fn embedding_timeout_falls_through_to_fallback() {
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant")]));
    let embedder = Arc::new(HangingEmbedder::new());
    let fallback = Arc::new(ScriptedFallback::new("We close at 8pm.", 0.4));
    let mut config = CascadeConfig::default();
    config.embed_timeout_ms = 50;
    let cascade = build_cascade(store, embedder, fallback.clone(), config);

    let ctx = TurnContext::new("tenant", "s1");
    // No lexical overlap with the stored pattern, so Stage 1b runs and
    // times out; the decision must still succeed.
    let decision = cascade.decide("do you deliver downtown", &ctx).await.unwrap();

    assert_eq!(decision.stage, Stage::Fallback);
    assert_eq!(decision.method, MatchMethod::Fallback);
    assert!(decision.should_escalate());
    assert_eq!(fallback.call_count(), 1);
}

#[tokio::test]
async fn miss_learns_then_repeat_is_suppressed() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("We're open 9 to 5.", 0.95));
    let cascade = build_cascade(
        store.clone(),
        embedder,
        fallback.clone(),
        CascadeConfig::default(),
    );

    let ctx = TurnContext::new("tenant", "s1");

    // Scenario 1: nothing cached yet; the turn escalates and a pattern is
    // learned off-turn.
    let first = cascade.decide("What are your hours?", &ctx).await.unwrap();
    assert_eq!(first.stage, Stage::Fallback);
    assert!(first.should_escalate());
    assert_eq!(fallback.call_count(), 1);

    wait_until(|| {
        let patterns = store.patterns.lock().unwrap();
        patterns.iter().any(|p| {
            p.namespace == "tenant"
                && p.key == "hours"
                && p.example_queries.iter().any(|e| e.text == "What are your hours?")
        })
    })
    .await;

    // Scenario 2: the same utterance now resolves from the cache.
    let second = cascade.decide("What are your hours?", &ctx).await.unwrap();
    assert!(!second.should_escalate());
    assert!(matches!(second.stage, Stage::Lexical | Stage::Semantic));
    assert_eq!(second.response_text(), Some("We're open 9 to 5."));
    assert_eq!(fallback.call_count(), 1);
}

#[tokio::test]
async fn low_confidence_fallback_does_not_learn() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("maybe this", 0.5));
    let cascade = build_cascade(
        store.clone(),
        embedder,
        fallback.clone(),
        CascadeConfig::default(),
    );

    let ctx = TurnContext::new("tenant", "s1");
    cascade.decide("What are your hours?", &ctx).await.unwrap();

    // Give the worker a moment; nothing should appear.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.patterns.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hits_lose_no_updates() {
    let pattern = hours_pattern("tenant");
    let pattern_id = pattern.id.clone();
    let store = Arc::new(MemoryStore::with_patterns(vec![pattern]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.95));
    let cascade = Arc::new(build_cascade(
        store.clone(),
        embedder,
        fallback,
        CascadeConfig::default(),
    ));

    const N: usize = 64;
    let mut handles = Vec::new();
    for i in 0..N {
        let cascade = cascade.clone();
        handles.push(tokio::spawn(async move {
            let ctx = TurnContext::new("tenant", format!("session-{i}"));
            let decision = cascade.decide("what are your hours", &ctx).await.unwrap();
            assert!(!decision.should_escalate());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // The live counter is exact immediately.
    let stats = cascade.stats("tenant").unwrap();
    assert_eq!(stats.total_hits, N as u64);

    // The persisted counter converges to exactly N.
    wait_until(|| store.hit_count(&pattern_id) == Some(N as u64)).await;
}

#[tokio::test]
async fn namespaces_never_leak() {
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant-a")]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.5));
    let cascade = build_cascade(
        store,
        embedder,
        fallback.clone(),
        CascadeConfig::default(),
    );

    // The exact phrasing that hits in tenant-a escalates in tenant-b.
    let hit = cascade
        .decide("What are your hours?", &TurnContext::new("tenant-a", "s1"))
        .await
        .unwrap();
    assert!(!hit.should_escalate());

    let other = cascade
        .decide("What are your hours?", &TurnContext::new("tenant-b", "s1"))
        .await
        .unwrap();
    assert!(other.should_escalate());
    assert_eq!(fallback.call_count(), 1);
}

#[tokio::test]
async fn deactivated_pattern_stops_matching() {
    let pattern = hours_pattern("tenant");
    let pattern_id = pattern.id.clone();
    let store = Arc::new(MemoryStore::with_patterns(vec![pattern]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.5));
    let mut config = CascadeConfig::default();
    config.deactivation_success_floor = 0.5;
    config.deactivation_min_samples = 3;
    let cascade = build_cascade(store, embedder, fallback.clone(), config);

    let ctx = TurnContext::new("tenant", "s1");
    assert!(!cascade.decide("what are your hours", &ctx).await.unwrap().should_escalate());

    // Three failures: rate 0.0 over 3 samples, below the 0.5 floor.
    for _ in 0..3 {
        cascade
            .record_feedback("tenant", &pattern_id, false)
            .await
            .unwrap();
    }

    let after = cascade.decide("what are your hours", &ctx).await.unwrap();
    assert!(after.should_escalate());
}

#[tokio::test]
async fn disabled_cascade_routes_straight_to_fallback() {
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant")]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.95));
    let mut config = CascadeConfig::default();
    config.enabled = false;
    let cascade = build_cascade(store.clone(), embedder.clone(), fallback.clone(), config);

    let ctx = TurnContext::new("tenant", "s1");
    let decision = cascade.decide("What are your hours?", &ctx).await.unwrap();

    assert_eq!(decision.stage, Stage::Fallback);
    assert_eq!(decision.method, MatchMethod::Disabled);
    assert_eq!(embedder.call_count(), 0);
    assert_eq!(fallback.call_count(), 1);

    // The disabled path never learns.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.patterns.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn denylisted_tenant_is_excluded() {
    let store = Arc::new(MemoryStore::with_patterns(vec![hours_pattern("tenant")]));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.5));
    let mut config = CascadeConfig::default();
    config.rollout.denylist = vec!["tenant".to_string()];
    let cascade = build_cascade(store, embedder, fallback, config);

    let decision = cascade
        .decide("What are your hours?", &TurnContext::new("tenant", "s1"))
        .await
        .unwrap();
    assert_eq!(decision.method, MatchMethod::Disabled);
}

#[tokio::test]
async fn fallback_failure_surfaces_to_caller() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::failing());
    let cascade = build_cascade(store, embedder, fallback, CascadeConfig::default());

    let result = cascade
        .decide("What are your hours?", &TurnContext::new("tenant", "s1"))
        .await;
    assert!(matches!(result, Err(ReflexError::Fallback { .. })));
}

#[tokio::test]
async fn colliding_intents_reinforce_one_pattern() {
    use reflex_core::learning::{HeuristicKeyInference, LearnRequest, LearningWorker};
    use reflex_core::PatternIndex;

    let store = Arc::new(MemoryStore::default());
    let index = Arc::new(PatternIndex::new(store.clone()));
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let (_queue, worker) = LearningWorker::new(
        store.clone(),
        index,
        embedder,
        Arc::new(HeuristicKeyInference),
    );

    // Two distinct phrasings that infer the same key ("deliver_pizza").
    worker
        .apply(LearnRequest {
            namespace: "tenant".into(),
            utterance: "Can you deliver pizza?".into(),
            response_text: "Yes, we deliver within 5 miles.".into(),
            confidence: 0.95,
        })
        .await
        .unwrap();
    worker
        .apply(LearnRequest {
            namespace: "tenant".into(),
            utterance: "Would you deliver pizza".into(),
            response_text: "Yes, we deliver within 5 miles.".into(),
            confidence: 0.92,
        })
        .await
        .unwrap();

    let patterns = store.get_active_patterns("tenant").await.unwrap();
    assert_eq!(patterns.len(), 1);
    let pattern = &patterns[0];
    assert_eq!(pattern.key, "deliver_pizza");
    assert_eq!(pattern.example_queries.len(), 2);
    // The collision nudged the success rate with one positive sample.
    assert_eq!(pattern.sample_count, 1);
    assert_eq!(pattern.success_count, 1);
}

#[tokio::test]
async fn blocklisted_utterance_is_rejected() {
    let store = Arc::new(MemoryStore::default());
    let embedder = Arc::new(ScriptedEmbedder::plain());
    let fallback = Arc::new(ScriptedFallback::new("generated", 0.5));
    let mut config = CascadeConfig::default();
    config.blocklist = vec!["lawsuit".to_string()];
    let cascade = build_cascade(store, embedder, fallback.clone(), config);

    let decision = cascade
        .decide("I want to talk about the lawsuit", &TurnContext::new("tenant", "s1"))
        .await
        .unwrap();
    assert!(matches!(
        decision.outcome,
        Outcome::Reject {
            reason: reflex_core::RejectReason::Blocked,
            ..
        }
    ));
    assert_eq!(fallback.call_count(), 0);
}

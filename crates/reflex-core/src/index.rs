//! Shared in-memory pattern index.
//!
//! One immutable [`NamespaceIndex`] snapshot per namespace, held in a
//! concurrent map. Readers clone the `Arc` and match against a consistent
//! view; writers build a replacement snapshot and swap it in, so reads never
//! tear. Live hit counters sit on the shared pattern entries as atomics and
//! survive snapshot swaps within a namespace generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::traits::PatternStore;
use crate::types::{ExampleQuery, Pattern};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());

/// Lowercase, strip punctuation, collapse whitespace.
///
/// Applied identically to keywords at index-build time and to utterances at
/// match time, so containment checks compare like with like.
pub fn normalize_text(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_ALNUM.replace_all(&lower, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A pattern plus its live hit counter.
#[derive(Debug)]
pub struct IndexedPattern {
    /// Immutable snapshot of the stored pattern.
    pub pattern: Pattern,
    hits: AtomicU64,
}

impl IndexedPattern {
    fn new(pattern: Pattern) -> Self {
        let hits = AtomicU64::new(pattern.hit_count);
        Self { pattern, hits }
    }

    /// Record one match and return the new count.
    pub fn record_hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current hit count including live (not yet persisted) hits.
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Immutable view of one namespace's active patterns.
///
/// Holds the patterns in creation order plus a normalized-keyword map so the
/// lexical stage avoids a linear scan over all patterns when the candidate
/// set is large.
#[derive(Debug, Default)]
pub struct NamespaceIndex {
    namespace: String,
    patterns: Vec<Arc<IndexedPattern>>,
    keyword_map: HashMap<String, Vec<usize>>,
}

impl NamespaceIndex {
    /// Build a snapshot from stored patterns (creation order expected).
    pub fn build(namespace: impl Into<String>, patterns: Vec<Pattern>) -> Self {
        let patterns: Vec<Arc<IndexedPattern>> = patterns
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| Arc::new(IndexedPattern::new(p)))
            .collect();

        let mut keyword_map: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, entry) in patterns.iter().enumerate() {
            for keyword in &entry.pattern.keywords {
                let normalized = normalize_text(keyword);
                if normalized.is_empty() {
                    continue;
                }
                keyword_map.entry(normalized).or_default().push(pos);
            }
        }

        Self {
            namespace: namespace.into(),
            patterns,
            keyword_map,
        }
    }

    /// The namespace this snapshot belongs to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Active patterns in creation order.
    pub fn patterns(&self) -> &[Arc<IndexedPattern>] {
        &self.patterns
    }

    /// Normalized keyword → pattern positions.
    pub fn keyword_map(&self) -> &HashMap<String, Vec<usize>> {
        &self.keyword_map
    }

    /// Find a pattern by its intent key.
    pub fn find_by_key(&self, key: &str) -> Option<&Arc<IndexedPattern>> {
        self.patterns.iter().find(|p| p.pattern.key == key)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// New snapshot with one more pattern appended.
    fn with_pattern(&self, pattern: Pattern) -> Self {
        let mut patterns: Vec<Pattern> = self
            .patterns
            .iter()
            .map(|p| {
                let mut snapshot = p.pattern.clone();
                snapshot.hit_count = p.hit_count();
                snapshot
            })
            .collect();
        patterns.push(pattern);
        Self::build(self.namespace.clone(), patterns)
    }

    /// New snapshot with a pattern removed (deactivation/deletion).
    fn without_pattern(&self, id: &str) -> Self {
        let patterns: Vec<Pattern> = self
            .patterns
            .iter()
            .filter(|p| p.pattern.id != id)
            .map(|p| {
                let mut snapshot = p.pattern.clone();
                snapshot.hit_count = p.hit_count();
                snapshot
            })
            .collect();
        Self::build(self.namespace.clone(), patterns)
    }

    /// New snapshot with one example query appended to a pattern.
    fn with_example(&self, id: &str, example: ExampleQuery) -> Self {
        let patterns: Vec<Pattern> = self
            .patterns
            .iter()
            .map(|p| {
                let mut snapshot = p.pattern.clone();
                snapshot.hit_count = p.hit_count();
                if snapshot.id == id {
                    snapshot.example_queries.push(example.clone());
                }
                snapshot
            })
            .collect();
        Self::build(self.namespace.clone(), patterns)
    }
}

/// Per-namespace counters surfaced to the host's analytics.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub namespace: String,
    pub pattern_count: usize,
    pub total_hits: u64,
}

/// Read-mostly index over all loaded namespaces, backed by the pattern
/// store.
///
/// Store read failures degrade to an empty snapshot for that namespace with
/// a logged warning; the cascade proceeds to the fallback rather than
/// failing the turn.
pub struct PatternIndex {
    store: Arc<dyn PatternStore>,
    namespaces: DashMap<String, Arc<NamespaceIndex>>,
}

impl PatternIndex {
    /// Create an index over the given store.
    pub fn new(store: Arc<dyn PatternStore>) -> Self {
        Self {
            store,
            namespaces: DashMap::new(),
        }
    }

    /// Current snapshot for a namespace, loading from the store on first
    /// access (or after invalidation).
    pub async fn snapshot(&self, namespace: &str) -> Arc<NamespaceIndex> {
        if let Some(existing) = self.namespaces.get(namespace) {
            return existing.clone();
        }

        let patterns = match self.store.get_active_patterns(namespace).await {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!(
                    namespace,
                    error = %e,
                    "pattern store read failed, degrading to empty snapshot"
                );
                Vec::new()
            }
        };

        let built = Arc::new(NamespaceIndex::build(namespace, patterns));
        // A concurrent loader may have raced us; either snapshot is valid.
        self.namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| built.clone())
            .clone()
    }

    /// Drop a namespace snapshot so the next request reloads from the store.
    pub fn invalidate(&self, namespace: &str) {
        self.namespaces.remove(namespace);
    }

    /// Append a freshly learned pattern to its namespace snapshot.
    ///
    /// A namespace that was never loaded is left alone; the next
    /// `snapshot()` reads the pattern from the store anyway.
    pub fn insert_pattern(&self, pattern: Pattern) {
        let namespace = pattern.namespace.clone();
        if let Some(mut entry) = self.namespaces.get_mut(&namespace) {
            *entry = Arc::new(entry.with_pattern(pattern));
        }
    }

    /// Remove a deactivated or deleted pattern from its namespace snapshot.
    pub fn remove_pattern(&self, namespace: &str, id: &str) {
        if let Some(mut entry) = self.namespaces.get_mut(namespace) {
            *entry = Arc::new(entry.without_pattern(id));
        }
    }

    /// Reflect an appended example query in the namespace snapshot.
    pub fn append_example(&self, namespace: &str, id: &str, example: ExampleQuery) {
        if let Some(mut entry) = self.namespaces.get_mut(namespace) {
            *entry = Arc::new(entry.with_example(id, example));
        }
    }

    /// Counters for one namespace, if loaded.
    pub fn stats(&self, namespace: &str) -> Option<IndexStats> {
        self.namespaces.get(namespace).map(|index| IndexStats {
            namespace: namespace.to_string(),
            pattern_count: index.len(),
            total_hits: index.patterns().iter().map(|p| p.hit_count()).sum(),
        })
    }
}

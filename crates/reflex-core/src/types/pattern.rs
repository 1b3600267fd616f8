//! Pattern types - the unit of cached knowledge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A representative phrasing with its precomputed embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleQuery {
    /// The phrasing text.
    pub text: String,
    /// Embedding vector for the text (fixed dimensionality per deployment).
    pub embedding: Vec<f32>,
}

impl ExampleQuery {
    /// Create a new example query.
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            embedding,
        }
    }
}

/// The answer served on a pattern hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CachedResponse {
    /// A literal answer text.
    Text { text: String },
    /// A structured action the host should execute (e.g. a transfer).
    Action {
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
}

impl CachedResponse {
    /// Create a text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an action response.
    pub fn action(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::Action {
            name: name.into(),
            arguments,
        }
    }

    /// The answer text, if this is a text response.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Action { .. } => None,
        }
    }
}

/// A learned or seeded unit matched against incoming utterances.
///
/// Scoped to one namespace; matching never crosses namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier.
    pub id: String,
    /// Stable intent key, unique within the namespace (e.g. "business_hours").
    pub key: String,
    /// Tenant namespace owning this pattern.
    pub namespace: String,
    /// Short literal strings for exact/fuzzy lexical matching.
    pub keywords: Vec<String>,
    /// Representative phrasings with precomputed embeddings.
    pub example_queries: Vec<ExampleQuery>,
    /// The answer served on a hit.
    pub cached_response: CachedResponse,
    /// Tenant business category. Analytics only, never consulted by matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Inactive patterns are excluded from matching but retained for audit.
    pub is_active: bool,
    /// Incremented on every successful match.
    pub hit_count: u64,
    /// Positive feedback observations.
    pub success_count: u64,
    /// Total feedback observations.
    pub sample_count: u64,
    /// Confidence reported by the fallback that produced this pattern.
    pub confidence: f32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Create a new active pattern with a fresh id.
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        cached_response: CachedResponse,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            key: key.into(),
            namespace: namespace.into(),
            keywords: Vec::new(),
            example_queries: Vec::new(),
            cached_response,
            domain: None,
            is_active: true,
            hit_count: 0,
            success_count: 0,
            sample_count: 0,
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the keyword set.
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Set the example queries.
    pub fn with_examples(mut self, examples: Vec<ExampleQuery>) -> Self {
        self.example_queries = examples;
        self
    }

    /// Set the tenant business category.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the originating confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// All-time success ratio in [0, 1].
    ///
    /// A pattern with no feedback yet reports 1.0 so that the deactivation
    /// floor can never fire before `deactivation_min_samples` observations.
    pub fn success_rate(&self) -> f32 {
        if self.sample_count == 0 {
            1.0
        } else {
            self.success_count as f32 / self.sample_count as f32
        }
    }
}

//! reflex-core - Core library for reflex.
//!
//! Reflex intercepts natural-language utterances before they reach an
//! expensive generative-response provider and decides, per tenant, whether
//! a cheap cached or rule-based answer can substitute for a full model
//! invocation. This crate provides the traits, types, and four-stage
//! decision cascade; provider crates (`reflex-stores`, `reflex-embeddings`,
//! `reflex-llm`) implement the external collaborators.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reflex_core::{CascadeConfig, CascadeRegistry, DecisionCascade, TurnContext};
//!
//! let registry = Arc::new(CascadeRegistry::new(CascadeConfig::default()));
//! let (cascade, worker) = DecisionCascade::new(registry, store, embedder, fallback);
//! tokio::spawn(worker.run());
//!
//! let ctx = TurnContext::new("tenant-a", "session-1");
//! let decision = cascade.decide("What are your hours?", &ctx).await?;
//! ```

pub mod bootstrap;
pub mod cascade;
pub mod config;
pub mod error;
pub mod index;
pub mod learning;
pub mod registry;
pub mod rollout;
pub mod stages;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use cascade::DecisionCascade;
pub use config::{CascadeConfig, ConfigHandle, RateLimitConfig, RolloutConfig};
pub use error::{ErrorCode, ReflexError, ReflexResult};
pub use index::{IndexStats, NamespaceIndex, PatternIndex};
pub use learning::{HeuristicKeyInference, KeyInference, LearningWorker};
pub use registry::CascadeRegistry;
pub use telemetry::{DecisionEvent, DecisionSink, TelemetryBus, TracingSink};
pub use traits::{
    Embedder, EmbedderConfig, EmbedderProvider, FallbackClient, FallbackConfig, FallbackProvider,
    FallbackResponse, PatternStore, SuccessRateUpdate,
};
pub use types::{
    CachedResponse, Decision, ExampleQuery, MatchMethod, Message, MessageRole, Outcome, Pattern,
    RejectReason, Stage, TurnContext,
};

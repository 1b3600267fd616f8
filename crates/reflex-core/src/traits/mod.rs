//! Traits for external collaborators.

mod embedder;
mod fallback;
mod pattern_store;

pub use embedder::{Embedder, EmbedderConfig, EmbedderProvider};
pub use fallback::{FallbackClient, FallbackConfig, FallbackProvider, FallbackResponse};
pub use pattern_store::{PatternStore, SuccessRateUpdate};

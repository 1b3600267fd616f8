//! reflex-embeddings - Embedding provider implementations for reflex.
//!
//! Providers are feature-gated; `openai` is on by default, `ollama` is
//! available behind the `ollama` feature (or `full`).

mod factory;
pub mod ollama;
pub mod openai;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

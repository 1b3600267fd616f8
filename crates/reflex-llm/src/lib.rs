//! reflex-llm - Generative fallback provider implementations for reflex.
//!
//! Providers are prompted for a structured `{answer, confidence}` reply;
//! see [`structured`] for the extraction rules. `openai` is on by default,
//! `ollama` is available behind the `ollama` feature (or `full`).

mod factory;
pub mod ollama;
pub mod openai;
pub mod structured;

pub use factory::FallbackFactory;
pub use ollama::OllamaFallback;
pub use openai::OpenAIFallback;
pub use structured::parse_structured;

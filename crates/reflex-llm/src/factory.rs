//! Factory for creating fallback providers.

use std::sync::Arc;

use reflex_core::error::ReflexResult;
use reflex_core::traits::{FallbackClient, FallbackConfig, FallbackProvider};

use crate::ollama::OllamaFallback;
use crate::openai::OpenAIFallback;

/// Factory for creating fallback providers.
pub struct FallbackFactory;

impl FallbackFactory {
    /// Create a fallback client from the given configuration.
    pub fn create(
        provider: FallbackProvider,
        config: FallbackConfig,
    ) -> ReflexResult<Arc<dyn FallbackClient>> {
        match provider {
            FallbackProvider::OpenAI => {
                let fallback = OpenAIFallback::new(config)?;
                Ok(Arc::new(fallback))
            }
            FallbackProvider::Ollama => {
                let fallback = OllamaFallback::new(config)?;
                Ok(Arc::new(fallback))
            }
        }
    }

    /// Create an OpenAI fallback with default configuration.
    pub fn openai() -> ReflexResult<Arc<dyn FallbackClient>> {
        Self::create(FallbackProvider::OpenAI, FallbackConfig::default())
    }

    /// Create an OpenAI fallback with a specific model.
    pub fn openai_with_model(model: impl Into<String>) -> ReflexResult<Arc<dyn FallbackClient>> {
        let config = FallbackConfig {
            model: model.into(),
            ..Default::default()
        };
        Self::create(FallbackProvider::OpenAI, config)
    }

    /// Create an Ollama fallback with default configuration.
    pub fn ollama() -> ReflexResult<Arc<dyn FallbackClient>> {
        Self::create(FallbackProvider::Ollama, FallbackConfig::default())
    }
}

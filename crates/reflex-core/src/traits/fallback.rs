//! Generative fallback trait and related types.
//!
//! The fallback provider is the cascade's last resort: its timeout and retry
//! policy belong to the provider implementation, not to the cascade.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ReflexResult;
use crate::types::Message;

/// Response from the generative fallback.
#[derive(Debug, Clone)]
pub struct FallbackResponse {
    /// Generated answer text.
    pub text: String,
    /// Self-reported confidence in [0, 1]. Providers that cannot produce a
    /// confidence signal report 0.0, which disables learning from the turn.
    pub confidence: f32,
}

/// Core fallback trait - all generative providers implement this.
#[async_trait]
pub trait FallbackClient: Send + Sync {
    /// Produce a free-form response for the utterance given prior turns.
    async fn respond(
        &self,
        utterance: &str,
        context: &[Message],
    ) -> ReflexResult<FallbackResponse>;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Fallback provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Model name/identifier.
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key (if not using environment variable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL for API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    512
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Fallback provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackProvider {
    #[default]
    OpenAI,
    Ollama,
}

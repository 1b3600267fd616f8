//! Ollama fallback provider implementation.

use async_trait::async_trait;

use reflex_core::error::{ReflexError, ReflexResult};
use reflex_core::traits::{FallbackClient, FallbackConfig, FallbackResponse};
use reflex_core::types::{Message, MessageRole};

use crate::structured::{parse_structured, STRUCTURED_ANSWER_PROMPT};

#[cfg(feature = "ollama")]
use ollama_rs::{
    generation::chat::{ChatMessage, ChatMessageRequest, MessageRole as OllamaRole},
    Ollama,
};

/// Ollama fallback provider.
pub struct OllamaFallback {
    #[cfg(feature = "ollama")]
    client: Ollama,
    config: FallbackConfig,
}

impl OllamaFallback {
    /// Create a new Ollama fallback provider.
    pub fn new(config: FallbackConfig) -> ReflexResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let url = url::Url::parse(&base_url)
            .map_err(|e| ReflexError::Configuration(format!("Invalid Ollama URL: {}", e)))?;

        let host = url.host_str().unwrap_or("localhost").to_string();
        let port = url.port().unwrap_or(11434);

        #[cfg(feature = "ollama")]
        let client = Ollama::new(format!("http://{}", host), port);

        #[cfg(not(feature = "ollama"))]
        let _ = (host, port);

        let mut config = config;
        if config.model.is_empty() {
            config.model = "llama3.1:8b".to_string();
        }

        Ok(Self {
            #[cfg(feature = "ollama")]
            client,
            config,
        })
    }

    #[cfg(feature = "ollama")]
    fn message_to_ollama(msg: &Message) -> ChatMessage {
        ChatMessage {
            role: match msg.role {
                MessageRole::System => OllamaRole::System,
                MessageRole::User => OllamaRole::User,
                MessageRole::Assistant => OllamaRole::Assistant,
            },
            content: msg.content.clone(),
            images: None,
        }
    }
}

#[async_trait]
impl FallbackClient for OllamaFallback {
    #[cfg(feature = "ollama")]
    async fn respond(
        &self,
        utterance: &str,
        context: &[Message],
    ) -> ReflexResult<FallbackResponse> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(Message::system(STRUCTURED_ANSWER_PROMPT));
        messages.extend(context.iter().cloned());
        messages.push(Message::user(utterance));

        let ollama_messages: Vec<ChatMessage> =
            messages.iter().map(Self::message_to_ollama).collect();

        let request = ChatMessageRequest::new(self.config.model.clone(), ollama_messages);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| ReflexError::fallback(format!("Ollama API error: {}", e)))?;

        let content = response
            .message
            .map(|m| m.content)
            .ok_or_else(|| ReflexError::fallback("Empty response content"))?;

        Ok(parse_structured(&content))
    }

    #[cfg(not(feature = "ollama"))]
    async fn respond(
        &self,
        _utterance: &str,
        _context: &[Message],
    ) -> ReflexResult<FallbackResponse> {
        Err(ReflexError::Configuration(
            "Ollama feature not enabled. Enable the 'ollama' feature.".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

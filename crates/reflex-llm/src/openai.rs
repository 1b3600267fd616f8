//! OpenAI fallback provider implementation.

use async_trait::async_trait;

use reflex_core::error::{ReflexError, ReflexResult};
use reflex_core::traits::{FallbackClient, FallbackConfig, FallbackResponse};
use reflex_core::types::{Message, MessageRole};

use crate::structured::{parse_structured, STRUCTURED_ANSWER_PROMPT};

#[cfg(feature = "openai")]
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest,
    },
    Client,
};

/// OpenAI fallback provider.
pub struct OpenAIFallback {
    #[cfg(feature = "openai")]
    client: Client<OpenAIConfig>,
    config: FallbackConfig,
}

impl OpenAIFallback {
    /// Create a new OpenAI fallback provider.
    pub fn new(config: FallbackConfig) -> ReflexResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                ReflexError::Configuration("OpenAI API key not found. Set OPENAI_API_KEY environment variable or provide api_key in config.".to_string())
            })?;

        #[cfg(feature = "openai")]
        let openai_config = if let Some(ref base_url) = config.base_url {
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        #[cfg(feature = "openai")]
        let client = Client::with_config(openai_config);

        #[cfg(not(feature = "openai"))]
        let _ = api_key;

        let mut config = config;
        if config.model.is_empty() {
            config.model = "gpt-4.1-nano-2025-04-14".to_string();
        }

        Ok(Self {
            #[cfg(feature = "openai")]
            client,
            config,
        })
    }

    /// Reasoning models reject temperature/max_tokens parameters.
    fn is_reasoning_model(&self) -> bool {
        let model_lower = self.config.model.to_lowercase();
        ["o1", "o3", "gpt-5"]
            .iter()
            .any(|m| model_lower.contains(m))
    }

    #[cfg(feature = "openai")]
    fn message_to_openai(msg: &Message) -> ChatCompletionRequestMessage {
        match msg.role {
            MessageRole::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            MessageRole::User => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            MessageRole::Assistant => {
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(
                        async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        ),
                    ),
                    name: None,
                    ..Default::default()
                })
            }
        }
    }
}

#[async_trait]
impl FallbackClient for OpenAIFallback {
    #[cfg(feature = "openai")]
    async fn respond(
        &self,
        utterance: &str,
        context: &[Message],
    ) -> ReflexResult<FallbackResponse> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(Message::system(STRUCTURED_ANSWER_PROMPT));
        messages.extend(context.iter().cloned());
        messages.push(Message::user(utterance));

        let chat_messages: Vec<ChatCompletionRequestMessage> =
            messages.iter().map(Self::message_to_openai).collect();

        let mut request = CreateChatCompletionRequest {
            model: self.config.model.clone(),
            messages: chat_messages,
            ..Default::default()
        };

        if !self.is_reasoning_model() {
            request.temperature = Some(self.config.temperature);
            request.max_tokens = Some(self.config.max_tokens);
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReflexError::fallback(format!("OpenAI API error: {}", e)))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| ReflexError::fallback("No response choices returned"))?;

        let content = choice
            .message
            .content
            .as_deref()
            .ok_or_else(|| ReflexError::fallback("Empty response content"))?;

        Ok(parse_structured(content))
    }

    #[cfg(not(feature = "openai"))]
    async fn respond(
        &self,
        _utterance: &str,
        _context: &[Message],
    ) -> ReflexResult<FallbackResponse> {
        Err(ReflexError::Configuration(
            "OpenAI feature not enabled. Enable the 'openai' feature.".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

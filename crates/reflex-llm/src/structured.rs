//! Structured-answer extraction shared by fallback providers.
//!
//! Providers are prompted to return `{"answer": ..., "confidence": ...}`.
//! Models do not always comply, so extraction degrades gracefully: an
//! unparsable reply is returned as plain text with confidence 0.0, which
//! structurally disables learning from that turn rather than failing it.

use reflex_core::traits::FallbackResponse;
use serde::Deserialize;

/// Instruction appended as the system prompt for every fallback call.
pub const STRUCTURED_ANSWER_PROMPT: &str = "You are a helpful assistant answering a caller's \
question on behalf of a business. Reply with a JSON object of the form \
{\"answer\": \"<your spoken reply>\", \"confidence\": <0.0-1.0 how certain you are the \
answer is correct and reusable for identical questions>}. Reply with JSON only.";

#[derive(Debug, Deserialize)]
struct StructuredAnswer {
    answer: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Extract a [`FallbackResponse`] from raw model output.
pub fn parse_structured(raw: &str) -> FallbackResponse {
    let trimmed = strip_code_fences(raw.trim());

    match serde_json::from_str::<StructuredAnswer>(trimmed) {
        Ok(parsed) => FallbackResponse {
            text: parsed.answer,
            confidence: parsed.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        },
        Err(_) => {
            tracing::debug!("fallback reply was not structured JSON, treating as plain text");
            FallbackResponse {
                text: raw.trim().to_string(),
                confidence: 0.0,
            }
        }
    }
}

/// Strip a surrounding Markdown code fence, with or without a language tag.
fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

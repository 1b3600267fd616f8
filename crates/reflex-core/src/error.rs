//! Error types for reflex operations.
//!
//! Validation rejections are not errors: a rejected utterance produces a
//! terminal [`crate::types::Decision`], not an `Err`. Stage 1b provider
//! failures are swallowed by the cascade (fail-open). The only error a
//! caller of the cascade ever sees is a Stage 2 fallback failure, because
//! there is no further fallback behind it.

use thiserror::Error;

/// Result type alias for reflex operations.
pub type ReflexResult<T> = Result<T, ReflexError>;

/// Main error type for all reflex operations.
#[derive(Error, Debug)]
pub enum ReflexError {
    /// Embedding generation failed or timed out.
    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generative fallback call failed. This is the one error that
    /// propagates out of the cascade.
    #[error("Fallback error: {message}")]
    Fallback {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Pattern store read or write failed.
    #[error("Pattern store error: {message}")]
    Store {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Pattern not found.
    #[error("Pattern not found: {pattern_id}")]
    PatternNotFound { pattern_id: String },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Embedding (EMB_xxx)
    EmbGenerationFailed,
    EmbTimeout,

    // Fallback (LLM_xxx)
    LlmGenerationFailed,
    LlmInvalidResponse,

    // Store (STORE_xxx)
    StoreOperationFailed,
    StoreConflict,

    // Parse (PARSE_xxx)
    ParseInvalidJson,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmbGenerationFailed => "EMB_001",
            ErrorCode::EmbTimeout => "EMB_002",
            ErrorCode::LlmGenerationFailed => "LLM_001",
            ErrorCode::LlmInvalidResponse => "LLM_002",
            ErrorCode::StoreOperationFailed => "STORE_001",
            ErrorCode::StoreConflict => "STORE_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl ReflexError {
    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbGenerationFailed,
            source: None,
        }
    }

    /// Create an embedding timeout error.
    pub fn embedding_timeout(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbTimeout,
            source: None,
        }
    }

    /// Create a fallback error.
    pub fn fallback(message: impl Into<String>) -> Self {
        Self::Fallback {
            message: message.into(),
            code: ErrorCode::LlmGenerationFailed,
            source: None,
        }
    }

    /// Create a pattern store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            code: ErrorCode::StoreOperationFailed,
            source: None,
        }
    }

    /// Create a store conflict error (duplicate namespace/key).
    pub fn store_conflict(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            code: ErrorCode::StoreConflict,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create a pattern-not-found error.
    pub fn not_found(pattern_id: impl Into<String>) -> Self {
        Self::PatternNotFound {
            pattern_id: pattern_id.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Embedding { code, .. } => *code,
            Self::Fallback { code, .. } => *code,
            Self::Store { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error came from the pattern store.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error() {
        let err = ReflexError::embedding("dimension mismatch");
        assert_eq!(err.code(), ErrorCode::EmbGenerationFailed);
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::EmbTimeout.as_str(), "EMB_002");
        assert_eq!(ErrorCode::StoreConflict.as_str(), "STORE_002");
    }

    #[test]
    fn test_store_error_predicate() {
        assert!(ReflexError::store("down").is_store());
        assert!(!ReflexError::fallback("down").is_store());
    }
}

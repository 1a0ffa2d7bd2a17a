//! Error types for Stratum

use thiserror::Error;

/// Result type alias using Stratum's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Stratum error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Community '{0}' not found.")]
    CommunityNotFound(String),

    #[error("Concept '{0}' not found.")]
    ConceptNotFound(String),

    // Oracle errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check that STRATUM_API_KEY or OPENROUTER_API_KEY is set.")]
    LLMError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("LLM returned output that does not match the expected shape for '{operation}': {reason}")]
    MalformedLlmOutput { operation: String, reason: String },

    // Graph engine errors (E200-E299)
    #[error("Clustering failed: {0}")]
    ClusteringFailed(String),

    #[error("Invalid projection name '{0}'. Use ASCII letters, digits and underscores only.")]
    InvalidProjectionName(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::CommunityNotFound(_) => "E001",
            Self::ConceptNotFound(_) => "E002",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::EmbeddingFailed(_) => "E103",
            Self::MalformedLlmOutput { .. } => "E104",
            Self::ClusteringFailed(_) => "E200",
            Self::InvalidProjectionName(_) => "E201",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LLMError(_) => Some("export STRATUM_API_KEY=<key>".to_string()),
            Self::RateLimited(secs) => Some(format!("Retry in {} seconds", secs)),
            Self::ClusteringFailed(_) => {
                Some("Re-run detection; the next run deletes partial state".to_string())
            }
            Self::ConfigError(_) => Some("Inspect config.toml under STRATUM_CONFIG_DIR".to_string()),
            _ => None,
        }
    }

    /// Build a malformed-output error for an oracle operation
    pub fn malformed(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedLlmOutput {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::CommunityNotFound("c1".into()).code(), "E001");
        assert_eq!(Error::ClusteringFailed("boom".into()).code(), "E200");
        assert_eq!(Error::malformed("drift_primer", "missing field").code(), "E104");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_malformed_message() {
        let err = Error::malformed("drift_hyde", "expected object");
        let msg = err.to_string();
        assert!(msg.contains("drift_hyde"));
        assert!(msg.contains("expected object"));
    }

    #[test]
    fn test_suggestions() {
        assert!(Error::RateLimited(30).suggestion().unwrap().contains("30"));
        assert!(Error::InvalidInput("x".into()).suggestion().is_none());
    }
}

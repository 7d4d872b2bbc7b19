//! Error types for ormlens

use thiserror::Error;

/// Result type alias for ormlens operations
pub type InspectResult<T> = Result<T, InspectError>;

/// Errors raised at the boundaries of an inspection run.
///
/// Nothing inside the analysis itself fails: unparseable SQL and missing
/// metadata degrade to "unknown" instead.
#[derive(Debug, Error)]
pub enum InspectError {
    /// Relationship metadata could not be read
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Query log could not be read
    #[error("Query log error: {0}")]
    Log(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// An EXPLAIN runner failed
    #[error("Explain error: {0}")]
    Explain(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl InspectError {
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::Log(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn explain(message: impl Into<String>) -> Self {
        Self::Explain(message.into())
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<serde_json::Error> for InspectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

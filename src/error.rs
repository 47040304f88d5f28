//! Error types for CourseMate.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type for CourseMate operations.
#[derive(Error, Debug)]
pub enum CourseMateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Course index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for CourseMate operations.
pub type Result<T> = std::result::Result<T, CourseMateError>;

/// Failure of a single tool adapter call.
///
/// Every variant counts as a failed invocation for the router. Absence of
/// data (unknown location, no holidays in range, forecast out of range) is
/// not an error; adapters report it as `ToolOutput::NotFound`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("service unreachable: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Upstream(String),

    #[error("course index unavailable: {0}")]
    IndexUnavailable(String),
}

impl ToolError {
    /// Short machine-friendly kind, used in logs and serialized records.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidInput(_) => "invalid_input",
            ToolError::Timeout(_) => "timeout",
            ToolError::Transport(_) => "transport",
            ToolError::Upstream(_) => "upstream",
            ToolError::IndexUnavailable(_) => "index_unavailable",
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ToolError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            ToolError::Upstream(e.to_string())
        } else {
            ToolError::Transport(e.to_string())
        }
    }
}

impl From<CourseMateError> for ToolError {
    fn from(e: CourseMateError) -> Self {
        match e {
            CourseMateError::IndexUnavailable(msg) => ToolError::IndexUnavailable(msg),
            CourseMateError::InvalidInput(msg) => ToolError::InvalidInput(msg),
            CourseMateError::Http(e) => e.into(),
            other => ToolError::Upstream(other.to_string()),
        }
    }
}

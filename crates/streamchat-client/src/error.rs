//! Error types for the chat client

use serde_json::Value;
use thiserror::Error;

/// Chat client error types
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request failed with status {status}")]
    RequestFailed { status: u16, details: Value },

    #[error("Response body is not readable as an event stream")]
    StreamUnavailable,

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    /// HTTP status code, when the server was reached and answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// User-facing message substituted into the transcript on failure.
    ///
    /// Classification follows the server status when one exists: 429 maps to
    /// a rate-limit message, 5xx to a server-error message, everything else
    /// to a generic failure message.
    pub fn user_message(&self) -> String {
        match self.status() {
            Some(429) => {
                "Rate limit exceeded. Please wait a moment and try again.".to_string()
            }
            Some(status) if status >= 500 => {
                "The server encountered an error. Please try again later.".to_string()
            }
            _ => "Sorry, something went wrong while generating a response. Please try again."
                .to_string(),
        }
    }
}

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

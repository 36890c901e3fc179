//! Error types for bloom-ai

use thiserror::Error;

/// Result type alias using bloom-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the generative-AI service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (status: {status})")]
    Api { status: String, message: String },

    /// No credential was configured
    #[error("No API key configured")]
    MissingApiKey,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// The service answered but produced no usable text
    #[error("Empty response from model{}", finish_suffix(.0))]
    EmptyResponse(Option<String>),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status and message
    pub fn api(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Whether this error can only be fixed by changing configuration.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::MissingApiKey | Error::InvalidConfig(_) => true,
            Error::Api { status, .. } => {
                matches!(
                    status.to_uppercase().as_str(),
                    "UNAUTHENTICATED" | "PERMISSION_DENIED" | "401" | "403"
                )
            }
            _ => false,
        }
    }
}

fn finish_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" (finish reason: {reason})"),
        None => String::new(),
    }
}

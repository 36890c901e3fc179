//! Error types for bloom-assistant
//!
//! Service failures surface to the user only through fixed messages; the
//! underlying [`bloom_ai::Error`] stays reachable as the error source for
//! logging.

use thiserror::Error;

/// Result type alias using bloom-assistant Error
pub type Result<T> = std::result::Result<T, Error>;

/// Shown when image analysis fails for any reason
pub const ANALYSIS_FAILED_MESSAGE: &str = "Could not analyze the image. Please try again.";

/// Shown when a chat reply cannot be obtained
pub const CHAT_FAILED_MESSAGE: &str = "Sorry, I couldn't get a response. Please try again.";

/// Errors surfaced by the two flows
#[derive(Error, Debug)]
pub enum Error {
    /// The single-shot call failed or returned nothing usable
    #[error("{}", ANALYSIS_FAILED_MESSAGE)]
    Request(#[source] bloom_ai::Error),

    /// The chat stream failed to open or broke mid-reply
    #[error("{}", CHAT_FAILED_MESSAGE)]
    Stream(#[source] bloom_ai::Error),

    /// Input was rejected before any call was made
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Whether the shell should ignore this error without telling the user
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Error::Validation(ValidationError::EmptyMessage | ValidationError::Busy)
        )
    }
}

/// Input problems detected before contacting the service
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("A reply is still streaming")]
    Busy,

    #[error("Chat session has not been started")]
    NotActivated,

    #[error("Please upload an image first.")]
    MissingImage,

    #[error("Unsupported image type '{0}'. Use PNG, JPG, or WEBP.")]
    UnsupportedImageType(String),

    #[error("Image content does not look like {declared}")]
    MimeMismatch { declared: &'static str },

    #[error("Image is empty")]
    EmptyImage,

    #[error("Image data is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Failed to read the image file.")]
    Unreadable(#[source] std::io::Error),
}

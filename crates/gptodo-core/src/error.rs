//! Error taxonomy for extraction.
//!
//! [`ExtractError`] is the single outward-facing failure channel of an
//! extraction; its `Display` text is the user-visible message. Persistence
//! failures and malformed stream lines never become an `ExtractError`; they
//! are logged where they happen.

use thiserror::Error;

/// Shown when the image payload is missing before any network activity.
pub const MSG_INVALID_IMAGE: &str = "Failed to process the image data.";
/// Shown when the upstream model reports it is over capacity.
pub const MSG_OVERLOADED: &str =
    "The AI model is currently overloaded. Please try again in a few minutes.";
/// Shown for any other server-reported error. The upstream text is masked.
pub const MSG_SERVICE_UNAVAILABLE: &str = "AI service unavailable. Please try again later.";
/// Shown when the request failed and no structured error could be read.
pub const MSG_EXTRACTION_FAILED: &str = "Failed to process image";
/// Shown when a successful response could not be interpreted.
pub const MSG_PARSE_FAILED: &str = "Failed to parse the list from the AI response.";

/// Substrings in an upstream error that mean "try again later".
const OVERLOAD_MARKERS: &[&str] = &["503 Service Unavailable", "overloaded", "UNAVAILABLE"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Bad or missing input, detected before any request is sent.
    #[error("{0}")]
    Validation(String),

    /// The model is temporarily over capacity.
    #[error("{}", MSG_OVERLOADED)]
    ServiceOverloaded,

    /// Network failure, non-2xx status, or an unrecognized server error.
    #[error("{0}")]
    ExtractionFailed(String),

    /// The server reported success but the payload was not a list of `{text}`.
    #[error("{}", MSG_PARSE_FAILED)]
    ResponseParse(String),
}

impl ExtractError {
    pub fn invalid_image() -> Self {
        Self::Validation(MSG_INVALID_IMAGE.to_string())
    }

    pub fn failed() -> Self {
        Self::ExtractionFailed(MSG_EXTRACTION_FAILED.to_string())
    }

    /// Map an error string reported by the backend onto the taxonomy.
    ///
    /// Overload markers win; anything else is masked behind a generic
    /// message so upstream detail does not leak to the user.
    pub fn from_server_message(message: &str) -> Self {
        if OVERLOAD_MARKERS.iter().any(|m| message.contains(m)) {
            Self::ServiceOverloaded
        } else {
            Self::ExtractionFailed(MSG_SERVICE_UNAVAILABLE.to_string())
        }
    }
}

/// Terminal failure while decoding an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream carried an `{"error": ...}` record.
    #[error("stream reported error: {0}")]
    Remote(String),
}

impl From<DecodeError> for ExtractError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Remote(message) => ExtractError::from_server_message(&message),
        }
    }
}

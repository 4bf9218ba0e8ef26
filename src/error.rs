//! # Error Handling
//!
//! Error taxonomy for the relay. The variants map one-to-one onto how a
//! failure is surfaced:
//!
//! - **Validation**: the originating connection gets an `error` message,
//!   nothing is retried.
//! - **Upstream**: a speech, translation, or synthesis vendor failed;
//!   logged and reported to operators as a generic failure, the chunk is
//!   abandoned.
//! - **Parse**: a malformed structured response from the translation
//!   service. Recovered locally with a heuristic and never user-visible;
//!   the variant exists for the rule loader and internal plumbing.
//! - **Config**: bad configuration or spam-rule file, fatal at startup.
//!
//! Noise (sub-threshold chunks, empty transcripts, spam matches) is not an
//! error at all; those paths halt silently and are modeled as pipeline
//! outcomes, not as this enum.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::protocol::ServerMessage;

/// Application error type covering the relay's failure taxonomy.
#[derive(Debug)]
pub enum RelayError {
    /// Client sent an invalid or unroutable request
    Validation(String),

    /// An external speech, translation, or synthesis service failed
    Upstream(String),

    /// A structured vendor response did not match the expected shape
    Parse(String),

    /// Configuration or rule file problems
    Config(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Validation(msg) => write!(f, "{}", msg),
            RelayError::Upstream(msg) => write!(f, "Upstream service error: {}", msg),
            RelayError::Parse(msg) => write!(f, "Parse error: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

/// HTTP mapping for the ambient endpoints (health, metrics). WebSocket
/// traffic converts errors with [`RelayError::to_message`] instead.
impl ResponseError for RelayError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            RelayError::Validation(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            RelayError::Upstream(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "upstream_error",
                msg.clone(),
            ),
            RelayError::Parse(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "parse_error",
                msg.clone(),
            ),
            RelayError::Config(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl RelayError {
    /// Convert into the outbound `error` message sent over a WebSocket.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Upstream(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Upstream(format!("I/O error: {}", err))
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

/// Shorthand for results using the relay error type.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_is_bare_message() {
        // Validation text goes verbatim into `error` payloads, matching the
        // wire contract ("Unknown callId", "No audio data", ...).
        let err = RelayError::Validation("Unknown callId".to_string());
        assert_eq!(err.to_string(), "Unknown callId");
    }

    #[test]
    fn test_to_message_wraps_error_payload() {
        let err = RelayError::Validation("missing callId".to_string());
        let json = serde_json::to_value(err.to_message()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "missing callId");
    }
}

//! # Relay Wire Protocol
//!
//! JSON messages exchanged over the per-participant WebSocket connection.
//! Every message carries a `type` discriminator; inbound and outbound
//! directions are separate tagged enums so that malformed payloads and
//! unknown discriminators are rejected at the deserialization boundary
//! instead of deep inside a handler.
//!
//! ## Message Flow:
//! - **Client → Server**: [`ClientMessage`] (register, audio chunks,
//!   language overrides, operator replies)
//! - **Server → Client**: [`ServerMessage`] (acks, transcriptions, language
//!   notifications, synthesized replies, errors)

use serde::{Deserialize, Serialize};

/// Display sentinel used in operator-facing payloads when no language has
/// been detected. Internal session state never stores this value.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Which side of the call a connection represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single connection carrying the person being translated for.
    Caller,
    /// A human agent receiving transcriptions and sending replies.
    Operator,
}

/// Inbound messages sent by clients over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Attach this connection to a call session in the given role.
    #[serde(rename_all = "camelCase")]
    Register { role: Role, call_id: String },

    /// A base64-encoded audio chunk recorded by the caller's client.
    #[serde(rename_all = "camelCase")]
    AudioChunk {
        call_id: String,
        file: String,
        /// Client-side capture timestamp (milliseconds); informational only.
        #[serde(default)]
        timestamp: Option<u64>,
    },

    /// Equivalent alias for [`ClientMessage::AudioChunk`] used by clients
    /// that upload one complete recording at a time.
    #[serde(rename_all = "camelCase")]
    AudioFile { call_id: String, file: String },

    /// Flush any buffered partial audio for the call.
    #[serde(rename_all = "camelCase")]
    AudioEnd { call_id: String },

    /// Operator override of the session's detected language.
    #[serde(rename_all = "camelCase")]
    SetLanguage {
        call_id: String,
        #[serde(default)]
        language: Option<String>,
    },

    /// Operator reply text to be translated and spoken to the caller.
    #[serde(rename_all = "camelCase")]
    OperatorReply { call_id: String, text: String },
}

/// Outbound server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledges a successful `register`. The detected language is only
    /// included for operators (it may be JSON `null` when undetermined).
    #[serde(rename_all = "camelCase")]
    Registered {
        role: Role,
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detected_language: Option<Option<String>>,
    },

    /// Validation or protocol failure, sent to the originating connection.
    Error { message: String },

    /// A transcribed and translated chunk of caller speech, fanned out to
    /// every operator on the call.
    #[serde(rename_all = "camelCase")]
    Transcription {
        call_id: String,
        text: String,
        detected_language: String,
        translation: String,
    },

    /// The detected language differs from the previous chunk's.
    #[serde(rename_all = "camelCase")]
    LanguageChanged {
        call_id: String,
        detected_language: String,
    },

    /// The session language was set explicitly or reset on caller
    /// disconnect (`null` in the reset case).
    #[serde(rename_all = "camelCase")]
    LanguageUpdated {
        call_id: String,
        detected_language: Option<String>,
    },

    /// Translated and synthesized operator reply, delivered to the caller
    /// connection only. `audio` is `null` when synthesis failed.
    #[serde(rename_all = "camelCase")]
    OperatorReply {
        text: String,
        language: String,
        audio: Option<String>,
        mime: String,
    },
}

impl ServerMessage {
    /// Helper for error replies.
    pub fn error<M: Into<String>>(message: M) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Replaces an absent language with the display sentinel for
    /// operator-facing payloads.
    pub fn display_language(language: Option<&str>) -> String {
        language.unwrap_or(UNKNOWN_LANGUAGE).to_string()
    }
}

//! # External Service Seam
//!
//! The relay treats the speech-to-text, chat/translation, and speech
//! synthesis vendors as opaque services behind async traits. The pipelines
//! only see these traits; the one production implementation is the
//! OpenAI-compatible HTTP client in [`openai`], and tests substitute mocks.

pub mod openai;

use async_trait::async_trait;
use std::path::Path;

use crate::error::RelayResult;

pub use openai::OpenAiClient;

/// Speech-to-text over a persisted audio artifact.
///
/// The vendor API is file-stream based, which is why the pipeline writes
/// each chunk to a temporary file before calling this.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio file at `path` to plain text. May return an
    /// empty string (no speech), which callers treat as a silent halt.
    async fn transcribe(&self, path: &Path) -> RelayResult<String>;
}

/// Chat/completion service used for language detection and translation.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Run one system+user exchange and return the assistant text verbatim.
    /// Callers parse structured replies themselves so that malformed output
    /// can be recovered heuristically instead of failing the exchange.
    async fn complete(&self, system: &str, user: &str) -> RelayResult<String>;
}

/// Synthesized audio returned by the speech service.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Text-to-speech synthesis.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Synthesize speech for `text`, returning audio bytes plus media type.
    async fn synthesize(&self, text: &str) -> RelayResult<SynthesizedAudio>;
}

//! # OpenAI-Compatible Service Client
//!
//! One HTTP client implementing all three vendor traits against an
//! OpenAI-compatible API surface: `/audio/transcriptions` (multipart file
//! upload), `/chat/completions`, and `/audio/speech`. The base URL and
//! model names come from [`ServicesConfig`], so the same client works
//! against the real API or a local stub.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use crate::config::ServicesConfig;
use crate::error::{RelayError, RelayResult};
use crate::services::{ChatCompletion, SpeechSynthesis, SpeechToText, SynthesizedAudio};

/// Media type assumed for uploaded capture chunks.
const UPLOAD_MIME: &str = "audio/webm";

/// Fallback media type when the synthesis response carries none.
const FALLBACK_AUDIO_MIME: &str = "audio/ogg";

/// Upper bound on assistant output for translation exchanges.
const MAX_COMPLETION_TOKENS: u32 = 1000;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    stt_model: String,
    chat_model: String,
    tts_model: String,
    voice: String,
}

impl OpenAiClient {
    pub fn new(config: &ServicesConfig, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key,
            stt_model: config.stt_model.clone(),
            chat_model: config.chat_model.clone(),
            tts_model: config.tts_model.clone(),
            voice: config.voice.clone(),
        }
    }

    /// Turn a non-success response into an Upstream error carrying the
    /// status and response body, which is where these APIs put the detail.
    async fn fail(operation: &str, resp: reqwest::Response) -> RelayError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        RelayError::Upstream(format!("{} returned {}: {}", operation, status, body))
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, path: &Path) -> RelayResult<String> {
        let bytes = tokio::fs::read(path).await?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("chunk.webm")
            .mime_str(UPLOAD_MIME)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.stt_model.clone());

        let resp = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::fail("speech-to-text", resp).await);
        }

        let body: TranscriptionResponse = resp.json().await?;
        Ok(body.text)
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> RelayResult<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.0,
            "max_tokens": MAX_COMPLETION_TOKENS
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::fail("chat completion", resp).await);
        }

        let body: ChatResponse = resp.json().await?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl SpeechSynthesis for OpenAiClient {
    async fn synthesize(&self, text: &str) -> RelayResult<SynthesizedAudio> {
        let body = json!({
            "model": self.tts_model,
            "voice": self.voice,
            "input": text
        });

        let resp = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::fail("speech synthesis", resp).await);
        }

        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_AUDIO_MIME)
            .to_string();
        let bytes = resp.bytes().await?.to_vec();

        Ok(SynthesizedAudio { bytes, mime })
    }
}

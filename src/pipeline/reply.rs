//! # Reply Pipeline
//!
//! Carries an operator's written reply back to the caller as speech. If
//! the session's detected language is undetermined or already the display
//! language, the reply is synthesized as written; otherwise it is first
//! translated into the caller's language. Translation failure degrades to
//! the untranslated text, and synthesis failure degrades to a text-only
//! message — a reply is never dropped outright once the call is known.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};
use crate::protocol::ServerMessage;
use crate::services::{ChatCompletion, SpeechSynthesis, SynthesizedAudio};
use crate::session::SessionRegistry;

/// What was ultimately sent to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyDelivery {
    /// Final text after any translation
    pub text: String,
    /// Language tag the caller message carried
    pub language: String,
    /// Whether synthesis produced audio
    pub synthesized: bool,
    /// Whether a caller connection accepted the message
    pub delivered: bool,
}

pub struct ReplyPipeline {
    registry: Arc<SessionRegistry>,
    chat: Arc<dyn ChatCompletion>,
    tts: Arc<dyn SpeechSynthesis>,
    display_language: String,
    display_language_name: String,
    default_audio_mime: String,
}

impl ReplyPipeline {
    pub fn new(
        registry: Arc<SessionRegistry>,
        chat: Arc<dyn ChatCompletion>,
        tts: Arc<dyn SpeechSynthesis>,
        display_language: String,
        display_language_name: String,
        default_audio_mime: String,
    ) -> Self {
        Self {
            registry,
            chat,
            tts,
            display_language,
            display_language_name,
            default_audio_mime,
        }
    }

    /// Translate and synthesize one operator reply, delivering exactly one
    /// message to the caller connection (never echoed to operators).
    pub async fn process(&self, call_id: &str, text: &str) -> RelayResult<ReplyDelivery> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| RelayError::Validation("Unknown callId".to_string()))?;

        let (final_text, language) = match session.detected_language() {
            Some(target) if !target.starts_with(&self.display_language) => {
                match self.chat.complete(&self.translate_prompt(&target), text).await {
                    Ok(translated) => {
                        let translated = translated.trim();
                        let final_text = if translated.is_empty() {
                            text.to_string()
                        } else {
                            translated.to_string()
                        };
                        (final_text, target)
                    }
                    Err(err) => {
                        // Degrade to the untranslated reply rather than
                        // failing the reply outright.
                        warn!(call_id = %call_id, error = %err, "Reply translation failed");
                        (text.to_string(), self.display_language.clone())
                    }
                }
            }
            _ => (text.to_string(), self.display_language.clone()),
        };

        let (audio, mime, synthesized) = match self.tts.synthesize(&final_text).await {
            Ok(SynthesizedAudio { bytes, mime }) => {
                debug!(call_id = %call_id, bytes = bytes.len(), "Reply audio synthesized");
                (Some(BASE64.encode(bytes)), mime, true)
            }
            Err(err) => {
                warn!(call_id = %call_id, error = %err, "Reply synthesis failed");
                (None, self.default_audio_mime.clone(), false)
            }
        };

        let delivered = session.send_caller(ServerMessage::OperatorReply {
            text: final_text.clone(),
            language: language.clone(),
            audio,
            mime,
        });

        Ok(ReplyDelivery {
            text: final_text,
            language,
            synthesized,
            delivered,
        })
    }

    fn translate_prompt(&self, target: &str) -> String {
        format!(
            "Translate the following {} text to {}. Reply with translated text only.",
            self.display_language_name, target
        )
    }
}

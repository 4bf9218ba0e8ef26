//! # Transcription Pipeline
//!
//! Processes one accepted audio chunk end to end: persist to a temporary
//! artifact, speech-to-text, spam filtering, language detection plus
//! translation, session language update, and operator broadcast. Each step
//! suspends only on external I/O; the caller holds the session's
//! processing gate for the duration, so at most one instance runs per call
//! at any instant.
//!
//! The temporary artifact exists because the speech-to-text API is
//! file-stream based. It is a `NamedTempFile`, so deletion on every exit
//! path (success, filtered, upstream failure) falls out of the guard drop.

use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RelayResult;
use crate::language;
use crate::protocol::ServerMessage;
use crate::services::{ChatCompletion, SpeechToText};
use crate::session::CallSession;
use crate::spam::SpamFilter;

/// How a pipeline run ended. Only `Completed` produces operator traffic;
/// the other variants are silent halts, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOutcome {
    /// Transcription and translation were broadcast to operators.
    Completed {
        text: String,
        language: Option<String>,
        translation: String,
        language_changed: bool,
    },
    /// The speech service returned an empty or whitespace-only transcript.
    NoSpeech,
    /// The raw transcript matched the spam filter.
    SpamTranscript,
    /// The translated text matched the display-language spam patterns.
    SpamTranslation,
}

pub struct TranscriptionPipeline {
    stt: Arc<dyn SpeechToText>,
    chat: Arc<dyn ChatCompletion>,
    spam: Arc<SpamFilter>,
    display_language_name: String,
}

impl TranscriptionPipeline {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        chat: Arc<dyn ChatCompletion>,
        spam: Arc<SpamFilter>,
        display_language_name: String,
    ) -> Self {
        Self {
            stt,
            chat,
            spam,
            display_language_name,
        }
    }

    /// Run the pipeline for one chunk. The caller must hold the session's
    /// processing guard; this function does not acquire it.
    pub async fn process(
        &self,
        session: &CallSession,
        audio: &[u8],
    ) -> RelayResult<TranscriptOutcome> {
        // 1. Persist the chunk; the speech API consumes a file stream.
        let mut artifact = tempfile::Builder::new()
            .prefix("chunk-")
            .suffix(".webm")
            .tempfile()?;
        artifact.write_all(audio)?;

        // 2. Speech-to-text. Empty output means silence, not failure.
        let transcript = self.stt.transcribe(artifact.path()).await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            debug!(call_id = %session.call_id(), "Transcription empty, skipping");
            return Ok(TranscriptOutcome::NoSpeech);
        }

        // 3. Spam stages 1 + 2 on the raw transcript.
        if self.spam.rejects_transcript(transcript) {
            info!(call_id = %session.call_id(), text = %transcript, "Spam transcript rejected");
            return Ok(TranscriptOutcome::SpamTranscript);
        }

        // 4. Language detection + translation with a structured-output
        //    contract; malformed replies are recovered, never surfaced.
        let reply = self
            .chat
            .complete(
                &self.detection_prompt(),
                &format!("Text: \"\"\"{}\"\"\"", transcript),
            )
            .await?;
        let (detected, translation) = parse_detection(&reply, transcript);

        // 5. Display-language spam stage on the translation.
        if self.spam.rejects_translation(&translation) {
            info!(call_id = %session.call_id(), translation = %translation, "Spam translation rejected");
            return Ok(TranscriptOutcome::SpamTranslation);
        }

        // 6. Unconditional session update, then compare against the
        //    previous value for the change notification.
        let previous = session.detected_language();
        session.set_detected_language(detected.clone());

        // 7. Broadcast the transcription to all operators.
        session.broadcast_operators(&ServerMessage::Transcription {
            call_id: session.call_id().to_string(),
            text: transcript.to_string(),
            detected_language: ServerMessage::display_language(detected.as_deref()),
            translation: translation.clone(),
        });

        // 8. Separate event when the language moved.
        let language_changed = previous != detected;
        if language_changed {
            info!(
                call_id = %session.call_id(),
                previous = ?previous,
                detected = ?detected,
                "Call language changed"
            );
            session.broadcast_operators(&ServerMessage::LanguageChanged {
                call_id: session.call_id().to_string(),
                detected_language: ServerMessage::display_language(detected.as_deref()),
            });
        }

        Ok(TranscriptOutcome::Completed {
            text: transcript.to_string(),
            language: detected,
            translation,
            language_changed,
        })
    }

    fn detection_prompt(&self) -> String {
        format!(
            "Detect the language of the following text and translate it to {}. \
             Reply with valid JSON: {{ \"detectedLanguage\": \"<iso-639-1 code or name>\", \
             \"translation\": \"<{} translation>\" }}",
            self.display_language_name, self.display_language_name
        )
    }
}

/// Extract `(detected language, translation)` from the service reply.
///
/// The primary contract is a JSON object with `detectedLanguage` (also
/// accepted under `language`/`lang`) and `translation`. Anything else falls
/// back to heuristic recovery: the first whitespace-delimited token is the
/// language guess and the full reply is the translation. A missing or empty
/// translation falls back to the transcript itself.
fn parse_detection(reply: &str, transcript: &str) -> (Option<String>, String) {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(reply) {
        let guess = ["detectedLanguage", "language", "lang"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()));
        let translation = map
            .get("translation")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(transcript)
            .to_string();
        return (language::normalize(guess), translation);
    }

    debug!("Structured detection reply unparseable, using fallback");
    let language = language::normalize(reply.split_whitespace().next());
    let translation = if reply.trim().is_empty() {
        transcript.to_string()
    } else {
        reply.to_string()
    };
    (language, translation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::protocol::Role;
    use crate::session::{ConnectionHandle, SessionRegistry};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct FixedStt {
        text: String,
        seen_bytes: Mutex<Vec<Vec<u8>>>,
    }

    impl FixedStt {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                seen_bytes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechToText for FixedStt {
        async fn transcribe(&self, path: &Path) -> RelayResult<String> {
            // The artifact must exist and carry the chunk while the call is
            // in flight.
            let bytes = std::fs::read(path).expect("audio artifact must exist");
            self.seen_bytes.lock().unwrap().push(bytes);
            Ok(self.text.clone())
        }
    }

    struct FailingStt;

    #[async_trait]
    impl SpeechToText for FailingStt {
        async fn transcribe(&self, _path: &Path) -> RelayResult<String> {
            Err(RelayError::Upstream("stt down".to_string()))
        }
    }

    struct FixedChat {
        reply: String,
        calls: AtomicUsize,
    }

    impl FixedChat {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatCompletion for FixedChat {
        async fn complete(&self, _system: &str, _user: &str) -> RelayResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn pipeline_with(
        stt: Arc<dyn SpeechToText>,
        chat: Arc<dyn ChatCompletion>,
    ) -> TranscriptionPipeline {
        TranscriptionPipeline::new(
            stt,
            chat,
            Arc::new(SpamFilter::default_rules()),
            "Arabic".to_string(),
        )
    }

    fn session_with_operator() -> (
        Arc<CallSession>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let registry = SessionRegistry::new();
        let (operator, rx) = ConnectionHandle::new();
        registry.register("123", Role::Operator, operator).unwrap();
        (registry.get("123").unwrap(), rx)
    }

    fn to_json(msg: ServerMessage) -> serde_json::Value {
        serde_json::to_value(msg).unwrap()
    }

    #[tokio::test]
    async fn test_completed_run_broadcasts_transcription_then_language_change() {
        let (session, mut rx) = session_with_operator();
        let stt = Arc::new(FixedStt::new("hello world"));
        let chat = Arc::new(FixedChat::new(
            r#"{"detectedLanguage":"en","translation":"مرحبا بالعالم"}"#,
        ));
        let pipeline = pipeline_with(stt.clone(), chat);

        let outcome = pipeline.process(&session, b"some-webm-bytes").await.unwrap();
        match outcome {
            TranscriptOutcome::Completed {
                ref text,
                ref language,
                language_changed,
                ..
            } => {
                assert_eq!(text, "hello world");
                assert_eq!(language.as_deref(), Some("en"));
                assert!(language_changed);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(session.detected_language(), Some("en".to_string()));
        assert_eq!(stt.seen_bytes.lock().unwrap()[0], b"some-webm-bytes");

        let first = to_json(rx.try_recv().unwrap());
        assert_eq!(first["type"], "transcription");
        assert_eq!(first["text"], "hello world");
        assert_eq!(first["detectedLanguage"], "en");
        assert_eq!(first["translation"], "مرحبا بالعالم");

        let second = to_json(rx.try_recv().unwrap());
        assert_eq!(second["type"], "language-changed");
        assert_eq!(second["detectedLanguage"], "en");
    }

    #[tokio::test]
    async fn test_same_language_skips_change_event() {
        let (session, mut rx) = session_with_operator();
        session.set_detected_language(Some("en".to_string()));

        let pipeline = pipeline_with(
            Arc::new(FixedStt::new("hello again")),
            Arc::new(FixedChat::new(
                r#"{"detectedLanguage":"en","translation":"مرحبا مجددا"}"#,
            )),
        );
        pipeline.process(&session, b"bytes").await.unwrap();

        let first = to_json(rx.try_recv().unwrap());
        assert_eq!(first["type"], "transcription");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_transcript_halts_silently() {
        let (session, mut rx) = session_with_operator();
        let chat = Arc::new(FixedChat::new("unused"));
        let pipeline = pipeline_with(Arc::new(FixedStt::new("   ")), chat.clone());

        let outcome = pipeline.process(&session, b"bytes").await.unwrap();
        assert_eq!(outcome, TranscriptOutcome::NoSpeech);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spam_transcript_never_reaches_translation_or_operators() {
        let (session, mut rx) = session_with_operator();
        let chat = Arc::new(FixedChat::new("unused"));
        let pipeline = pipeline_with(
            Arc::new(FixedStt::new("thank you for watching")),
            chat.clone(),
        );

        let outcome = pipeline.process(&session, b"bytes").await.unwrap();
        assert_eq!(outcome, TranscriptOutcome::SpamTranscript);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(session.detected_language(), None);
    }

    #[tokio::test]
    async fn test_spam_translation_halts_after_detection() {
        let (session, mut rx) = session_with_operator();
        let pipeline = pipeline_with(
            Arc::new(FixedStt::new("some innocuous text")),
            Arc::new(FixedChat::new(
                r#"{"detectedLanguage":"en","translation":"يرجى الاشتراك في القناة"}"#,
            )),
        );

        let outcome = pipeline.process(&session, b"bytes").await.unwrap();
        assert_eq!(outcome, TranscriptOutcome::SpamTranslation);
        assert!(rx.try_recv().is_err());
        // Halted before the session update.
        assert_eq!(session.detected_language(), None);
    }

    #[tokio::test]
    async fn test_malformed_detection_reply_recovers_heuristically() {
        let (session, mut rx) = session_with_operator();
        let pipeline = pipeline_with(
            Arc::new(FixedStt::new("bonjour tout le monde")),
            Arc::new(FixedChat::new("fr مرحبا بالجميع")),
        );

        let outcome = pipeline.process(&session, b"bytes").await.unwrap();
        match outcome {
            TranscriptOutcome::Completed {
                language,
                translation,
                ..
            } => {
                assert_eq!(language.as_deref(), Some("fr"));
                assert_eq!(translation, "fr مرحبا بالجميع");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(to_json(rx.try_recv().unwrap())["type"], "transcription");
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let (session, mut rx) = session_with_operator();
        let pipeline = pipeline_with(Arc::new(FailingStt), Arc::new(FixedChat::new("unused")));

        let err = pipeline.process(&session, b"bytes").await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
        // The pipeline itself broadcasts nothing on failure; the ingest
        // layer owns the generic failure notice.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_parse_detection_accepts_alternate_keys() {
        let (lang, translation) =
            parse_detection(r#"{"lang":"ES","translation":"هلا"}"#, "hola");
        assert_eq!(lang.as_deref(), Some("es"));
        assert_eq!(translation, "هلا");

        let (lang, translation) = parse_detection(r#"{"language":"de-DE"}"#, "hallo");
        assert_eq!(lang.as_deref(), Some("de"));
        assert_eq!(translation, "hallo");
    }

    #[test]
    fn test_parse_detection_fallback_guesses_first_token() {
        let (lang, translation) = parse_detection("en: some translation", "hi there");
        // "en:" strips its suffix through normalization.
        assert_eq!(lang.as_deref(), Some("en"));
        assert_eq!(translation, "en: some translation");

        let (lang, translation) = parse_detection("", "hi there");
        assert_eq!(lang, None);
        assert_eq!(translation, "hi there");
    }
}

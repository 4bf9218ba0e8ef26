//! # Audio Ingest Serializer
//!
//! Admission control between the WebSocket layer and the transcription
//! pipeline. Validates the chunk, drops sub-threshold noise, and acquires
//! the session's pipeline gate before invoking the pipeline, so overlapping
//! chunks for one call queue up in arrival (FIFO) order while other calls
//! proceed untouched.
//!
//! Upstream failures are absorbed here: operators get one generic failure
//! notice and the session stays usable for the next chunk. Only validation
//! problems propagate to the sending connection.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{RelayError, RelayResult};
use crate::pipeline::{TranscriptOutcome, TranscriptionPipeline};
use crate::protocol::ServerMessage;
use crate::session::SessionRegistry;

/// How an accepted-or-rejected chunk left the serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The pipeline ran; see the inner outcome for what it produced.
    Processed(TranscriptOutcome),
    /// Below the noise threshold; dropped without a pipeline run.
    DroppedTooSmall,
    /// An upstream service failed; operators were notified and the chunk
    /// was abandoned.
    Failed,
}

pub struct AudioIngest {
    registry: Arc<SessionRegistry>,
    pipeline: TranscriptionPipeline,
    min_chunk_bytes: usize,
}

impl AudioIngest {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: TranscriptionPipeline,
        min_chunk_bytes: usize,
    ) -> Self {
        Self {
            registry,
            pipeline,
            min_chunk_bytes,
        }
    }

    /// Admit one base64-encoded chunk for a call.
    ///
    /// Validation failures (unknown call, missing or undecodable payload)
    /// are the caller's to report back on the originating connection; every
    /// other ending is already handled here.
    pub async fn enqueue(&self, call_id: &str, file: &str) -> RelayResult<IngestOutcome> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| RelayError::Validation("Unknown callId".to_string()))?;

        if file.is_empty() {
            return Err(RelayError::Validation("No audio data".to_string()));
        }

        let audio = BASE64
            .decode(file)
            .map_err(|_| RelayError::Validation("Invalid audio payload".to_string()))?;

        if audio.len() < self.min_chunk_bytes {
            debug!(
                call_id = %call_id,
                bytes = audio.len(),
                "Audio chunk below noise threshold, skipping"
            );
            return Ok(IngestOutcome::DroppedTooSmall);
        }

        debug!(call_id = %call_id, bytes = audio.len(), "Processing audio chunk");

        // FIFO slot per session: overlapping chunks wait here, in order,
        // while chunks for other calls run concurrently.
        let _guard = session.begin_processing().await;

        match self.pipeline.process(&session, &audio).await {
            Ok(outcome) => Ok(IngestOutcome::Processed(outcome)),
            Err(err) => {
                error!(call_id = %call_id, error = %err, "Transcription pipeline failed");
                session.broadcast_operators(&ServerMessage::error("Transcription failed"));
                Ok(IngestOutcome::Failed)
            }
        }
    }
}

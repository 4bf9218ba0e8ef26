//! # Audio Processing Pipelines
//!
//! Orchestration of the external speech services, one module per
//! direction:
//!
//! - [`transcribe`]: caller audio → text → spam filter → language
//!   detection + translation → operator broadcast
//! - [`reply`]: operator text → translation → speech synthesis → caller

pub mod reply;
pub mod transcribe;

pub use reply::{ReplyDelivery, ReplyPipeline};
pub use transcribe::{TranscriptOutcome, TranscriptionPipeline};

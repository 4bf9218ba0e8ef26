//! # Call Session Management
//!
//! Per-call state and the operations around it:
//!
//! - [`call`]: one call's connections, language state, and pipeline gate
//! - [`registry`]: the callId → session map, attach/detach handling, and
//!   the broadcast bus
//! - [`ingest`]: serialized admission of audio chunks into the
//!   transcription pipeline

pub mod call;
pub mod ingest;
pub mod registry;

pub use call::{CallSession, ConnectionHandle};
pub use ingest::{AudioIngest, IngestOutcome};
pub use registry::SessionRegistry;

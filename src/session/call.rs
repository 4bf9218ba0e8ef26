//! # Call Session State
//!
//! One [`CallSession`] per call identifier, created lazily on the first
//! `register` and kept for the process lifetime. Holds the caller slot, the
//! operator set, the detected-language state, and the pipeline gate that
//! serializes transcription for this call.
//!
//! ## Session Lifecycle (informal state machine):
//! 1. **Idle**: no caller attached
//! 2. **Active**: caller attached, language unknown
//! 3. **LanguageKnown**: a non-null detected language recorded
//! 4. back to **Idle** on caller detach (language reset to null)
//!
//! Operator attachment is orthogonal: operators can join before, during,
//! or after a caller is present.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Sending half of a participant connection.
///
/// The WebSocket actor owns the receiving half and drains it into the
/// socket; everything else holds clones of this handle. A send to a closed
/// connection fails and is skipped, which is how the broadcast bus treats
/// departed operators between disconnect and detach.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver its connection actor will drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Best-effort delivery. Returns false when the connection is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// What a connection turned out to be when it was detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachOutcome {
    pub was_caller: bool,
    pub was_operator: bool,
}

/// State for a single call.
///
/// ## Thread Safety:
/// All mutable fields sit behind their own lock so attach/detach, language
/// updates, and broadcasts from different tasks never block each other for
/// longer than a field copy. The transcription gate is a `tokio` mutex:
/// waiters queue in FIFO order and the slot is released on every exit path
/// when the guard drops.
pub struct CallSession {
    call_id: String,

    /// At most one caller connection; replaced on re-registration
    caller: RwLock<Option<ConnectionHandle>>,

    /// Operator connections by connection id; unbounded membership
    operators: RwLock<HashMap<Uuid, ConnectionHandle>>,

    /// Canonical language code, or None while undetermined
    detected_language: RwLock<Option<String>>,

    /// Timestamp of the last successful language update
    last_updated: RwLock<DateTime<Utc>>,

    created_at: DateTime<Utc>,

    /// Serializes transcription: one pipeline instance per call at a time
    gate: tokio::sync::Mutex<()>,

    /// Observable snapshot of the gate for metrics and diagnostics
    processing: AtomicBool,
}

impl CallSession {
    pub fn new<S: Into<String>>(call_id: S) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            caller: RwLock::new(None),
            operators: RwLock::new(HashMap::new()),
            detected_language: RwLock::new(None),
            last_updated: RwLock::new(now),
            created_at: now,
            gate: tokio::sync::Mutex::new(()),
            processing: AtomicBool::new(false),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attach (or replace) the caller connection. Any previous caller is
    /// evicted silently; its handle simply stops receiving messages.
    pub fn attach_caller(&self, handle: ConnectionHandle) {
        *self.caller.write().unwrap() = Some(handle);
    }

    /// Add an operator connection to the set.
    pub fn attach_operator(&self, handle: ConnectionHandle) {
        self.operators.write().unwrap().insert(handle.id(), handle);
    }

    /// Remove whatever role this connection held, reporting which it was.
    pub fn detach(&self, connection_id: Uuid) -> DetachOutcome {
        let mut was_caller = false;
        {
            let mut caller = self.caller.write().unwrap();
            if caller.as_ref().map(|h| h.id()) == Some(connection_id) {
                *caller = None;
                was_caller = true;
            }
        }

        let was_operator = self
            .operators
            .write()
            .unwrap()
            .remove(&connection_id)
            .is_some();

        DetachOutcome {
            was_caller,
            was_operator,
        }
    }

    pub fn has_caller(&self) -> bool {
        self.caller.read().unwrap().is_some()
    }

    pub fn operator_count(&self) -> usize {
        self.operators.read().unwrap().len()
    }

    /// Current detected language (canonical code or None).
    pub fn detected_language(&self) -> Option<String> {
        self.detected_language.read().unwrap().clone()
    }

    /// Store a new detected language and bump the update timestamp. The
    /// value must already be normalized; `None` means undetermined.
    pub fn set_detected_language(&self, language: Option<String>) {
        *self.detected_language.write().unwrap() = language;
        *self.last_updated.write().unwrap() = Utc::now();
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        *self.last_updated.read().unwrap()
    }

    /// Whether a transcription pipeline instance currently holds the gate.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Acquire the transcription slot for this call. Waits in FIFO order
    /// behind any pipeline already running; the slot is released when the
    /// returned guard drops, on success and failure alike.
    pub async fn begin_processing(&self) -> ProcessingGuard<'_> {
        let permit = self.gate.lock().await;
        self.processing.store(true, Ordering::SeqCst);
        ProcessingGuard {
            _permit: permit,
            flag: &self.processing,
        }
    }

    /// Fan a message out to every operator connection. Closed connections
    /// are skipped; pruning happens only on the detach path.
    pub fn broadcast_operators(&self, message: &ServerMessage) {
        let operators = self.operators.read().unwrap();
        for handle in operators.values() {
            if !handle.send(message.clone()) {
                trace!(
                    call_id = %self.call_id,
                    connection_id = %handle.id(),
                    "Skipping closed operator connection"
                );
            }
        }
    }

    /// Deliver a message to the caller connection, if one is attached and
    /// still open.
    pub fn send_caller(&self, message: ServerMessage) -> bool {
        match self.caller.read().unwrap().as_ref() {
            Some(handle) => handle.send(message),
            None => false,
        }
    }
}

/// Held for the duration of one transcription pipeline run.
pub struct ProcessingGuard<'a> {
    _permit: tokio::sync::MutexGuard<'a, ()>,
    flag: &'a AtomicBool,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_slot_is_replaced_on_reattach() {
        let session = CallSession::new("123");
        let (first, mut first_rx) = ConnectionHandle::new();
        let (second, mut second_rx) = ConnectionHandle::new();

        session.attach_caller(first);
        session.attach_caller(second);

        assert!(session.send_caller(ServerMessage::error("ping")));
        assert!(second_rx.try_recv().is_ok());
        assert!(first_rx.try_recv().is_err());
    }

    #[test]
    fn test_detach_reports_role() {
        let session = CallSession::new("123");
        let (caller, _caller_rx) = ConnectionHandle::new();
        let (operator, _operator_rx) = ConnectionHandle::new();
        let caller_id = caller.id();
        let operator_id = operator.id();

        session.attach_caller(caller);
        session.attach_operator(operator);

        let outcome = session.detach(caller_id);
        assert!(outcome.was_caller);
        assert!(!outcome.was_operator);
        assert!(!session.has_caller());

        let outcome = session.detach(operator_id);
        assert!(outcome.was_operator);
        assert_eq!(session.operator_count(), 0);

        // Detaching an unknown connection is a no-op.
        let outcome = session.detach(Uuid::new_v4());
        assert!(!outcome.was_caller && !outcome.was_operator);
    }

    #[test]
    fn test_broadcast_skips_closed_operators() {
        let session = CallSession::new("123");
        let (open, mut open_rx) = ConnectionHandle::new();
        let (closed, closed_rx) = ConnectionHandle::new();

        session.attach_operator(open);
        session.attach_operator(closed);
        drop(closed_rx);

        session.broadcast_operators(&ServerMessage::error("hello"));
        assert!(open_rx.try_recv().is_ok());
        assert_eq!(session.operator_count(), 2);
    }

    #[tokio::test]
    async fn test_gate_admits_one_pipeline_at_a_time() {
        let session = std::sync::Arc::new(CallSession::new("123"));

        let guard = session.begin_processing().await;
        assert!(session.is_processing());

        // A second acquisition attempt must not complete while the first
        // guard is alive.
        let contender = {
            let session = session.clone();
            tokio::spawn(async move {
                let _guard = session.begin_processing().await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(!session.is_processing());
    }

    #[test]
    fn test_language_update_bumps_timestamp() {
        let session = CallSession::new("123");
        let before = session.last_updated();
        session.set_detected_language(Some("en".to_string()));
        assert_eq!(session.detected_language(), Some("en".to_string()));
        assert!(session.last_updated() >= before);
    }
}

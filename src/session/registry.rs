//! # Session Registry and Broadcast Bus
//!
//! Owns the callId → [`CallSession`] map. Sessions are created lazily on
//! the first `register` for an unseen identifier and are never removed;
//! after a disconnect they persist with their (reset) state so a later
//! caller or operator can pick the call back up.
//!
//! The registry is also the broadcast bus: fan-out to a call's operators
//! and delivery to its caller go through here, keyed by call identifier.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::language;
use crate::protocol::{Role, ServerMessage};
use crate::session::call::{CallSession, ConnectionHandle};

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Attach a connection to a call in the given role, creating the
    /// session if this is the first time the identifier is seen.
    ///
    /// Returns the `registered` acknowledgment to send back: callers get a
    /// bare ack, operators additionally get the current detected language
    /// (which may be null).
    pub fn register(
        &self,
        call_id: &str,
        role: Role,
        handle: ConnectionHandle,
    ) -> RelayResult<ServerMessage> {
        if call_id.trim().is_empty() {
            return Err(RelayError::Validation("missing callId".to_string()));
        }

        let session = self
            .sessions
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(CallSession::new(call_id)))
            .clone();

        match role {
            Role::Caller => {
                session.attach_caller(handle);
                info!(call_id = %call_id, "Caller registered");
                Ok(ServerMessage::Registered {
                    role: Role::Caller,
                    call_id: call_id.to_string(),
                    detected_language: None,
                })
            }
            Role::Operator => {
                session.attach_operator(handle);
                info!(call_id = %call_id, operators = session.operator_count(), "Operator registered");
                Ok(ServerMessage::Registered {
                    role: Role::Operator,
                    call_id: call_id.to_string(),
                    detected_language: Some(session.detected_language()),
                })
            }
        }
    }

    /// Remove a closed connection from every session it appears in. If it
    /// was a caller, the session's language resets to undetermined and all
    /// operators on the call are notified with a null language update.
    pub fn detach(&self, connection_id: Uuid) {
        for entry in self.sessions.iter() {
            let session = entry.value();
            let outcome = session.detach(connection_id);

            if outcome.was_caller {
                session.set_detected_language(None);
                info!(call_id = %session.call_id(), "Caller disconnected, language reset");
                session.broadcast_operators(&ServerMessage::LanguageUpdated {
                    call_id: session.call_id().to_string(),
                    detected_language: None,
                });
            } else if outcome.was_operator {
                debug!(call_id = %session.call_id(), "Operator disconnected");
            }
        }
    }

    /// Explicit language override. Unknown call identifiers are ignored
    /// without a reply; the notification carries the display sentinel when
    /// the normalized value is undetermined, but the stored state stays
    /// `None`.
    pub fn set_language(&self, call_id: &str, raw: Option<&str>) {
        let Some(session) = self.get(call_id) else {
            return;
        };

        let normalized = language::normalize(raw);
        session.set_detected_language(normalized.clone());
        session.broadcast_operators(&ServerMessage::LanguageUpdated {
            call_id: call_id.to_string(),
            detected_language: Some(ServerMessage::display_language(normalized.as_deref())),
        });
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions with a transcription pipeline currently running.
    pub fn processing_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_processing())
            .count()
    }

    /// Bus: fan a message out to all operators of a call.
    pub fn broadcast_to_operators(&self, call_id: &str, message: &ServerMessage) {
        if let Some(session) = self.get(call_id) {
            session.broadcast_operators(message);
        }
    }

    /// Bus: deliver a message to the caller of a call, if attached.
    pub fn send_to_caller(&self, call_id: &str, message: ServerMessage) -> bool {
        match self.get(call_id) {
            Some(session) => session.send_caller(message),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator_json(msg: ServerMessage) -> serde_json::Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn test_register_rejects_empty_call_id() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();
        let err = registry.register("", Role::Caller, handle).unwrap_err();
        assert_eq!(err.to_string(), "missing callId");
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_operator_can_register_before_caller() {
        let registry = SessionRegistry::new();
        let (operator, _rx) = ConnectionHandle::new();

        let ack = registry.register("123", Role::Operator, operator).unwrap();
        let json = operator_json(ack);
        assert_eq!(json["role"], "operator");
        assert!(json["detectedLanguage"].is_null());

        let (caller, _rx) = ConnectionHandle::new();
        let ack = registry.register("123", Role::Caller, caller).unwrap();
        let json = operator_json(ack);
        assert_eq!(json["role"], "caller");
        assert!(json.get("detectedLanguage").is_none());

        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_operator_ack_carries_current_language() {
        let registry = SessionRegistry::new();
        let (caller, _caller_rx) = ConnectionHandle::new();
        registry.register("123", Role::Caller, caller).unwrap();
        registry.get("123").unwrap().set_detected_language(Some("en".to_string()));

        let (operator, _rx) = ConnectionHandle::new();
        let ack = registry.register("123", Role::Operator, operator).unwrap();
        assert_eq!(operator_json(ack)["detectedLanguage"], "en");
    }

    #[test]
    fn test_caller_detach_resets_language_and_notifies_operators() {
        let registry = SessionRegistry::new();
        let (caller, _caller_rx) = ConnectionHandle::new();
        let caller_id = caller.id();
        registry.register("123", Role::Caller, caller).unwrap();

        let (operator, mut operator_rx) = ConnectionHandle::new();
        registry.register("123", Role::Operator, operator).unwrap();

        registry.get("123").unwrap().set_detected_language(Some("en".to_string()));

        registry.detach(caller_id);

        let session = registry.get("123").unwrap();
        assert_eq!(session.detected_language(), None);
        assert!(!session.has_caller());

        let notification = operator_rx.try_recv().unwrap();
        let json = operator_json(notification);
        assert_eq!(json["type"], "language-updated");
        assert!(json["detectedLanguage"].is_null());

        // The session itself survives the disconnect.
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_operator_detach_is_silent() {
        let registry = SessionRegistry::new();
        let (first, mut first_rx) = ConnectionHandle::new();
        let (second, _second_rx) = ConnectionHandle::new();
        let second_id = second.id();
        registry.register("123", Role::Operator, first).unwrap();
        registry.register("123", Role::Operator, second).unwrap();

        registry.detach(second_id);

        assert!(first_rx.try_recv().is_err());
        assert_eq!(registry.get("123").unwrap().operator_count(), 1);
    }

    #[test]
    fn test_set_language_normalizes_and_notifies() {
        let registry = SessionRegistry::new();
        let (operator, mut operator_rx) = ConnectionHandle::new();
        registry.register("123", Role::Operator, operator).unwrap();
        operator_rx.try_recv().ok();

        registry.set_language("123", Some("EN-US"));
        assert_eq!(
            registry.get("123").unwrap().detected_language(),
            Some("en".to_string())
        );
        let json = operator_json(operator_rx.try_recv().unwrap());
        assert_eq!(json["type"], "language-updated");
        assert_eq!(json["detectedLanguage"], "en");

        // Undetermined values store as None but display as the sentinel.
        registry.set_language("123", Some("unknown"));
        assert_eq!(registry.get("123").unwrap().detected_language(), None);
        let json = operator_json(operator_rx.try_recv().unwrap());
        assert_eq!(json["detectedLanguage"], "unknown");
    }

    #[test]
    fn test_set_language_unknown_call_is_ignored() {
        let registry = SessionRegistry::new();
        registry.set_language("nope", Some("en"));
        assert_eq!(registry.session_count(), 0);
    }
}

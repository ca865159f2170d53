use serde::{Deserialize, Serialize};

use crate::Message;

/// Which push stream an event arrived on. The streams carry no ordering
/// guarantee relative to each other or to send acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushKind {
    Created,
    Updated,
}

/// Raw push payload as delivered by the subscription transport. Payloads are
/// untrusted: they may be null, empty, or structurally invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub kind: PushKind,
    pub payload: serde_json::Value,
}

impl PushEvent {
    pub fn created(payload: serde_json::Value) -> Self {
        Self {
            kind: PushKind::Created,
            payload,
        }
    }

    pub fn updated(payload: serde_json::Value) -> Self {
        Self {
            kind: PushKind::Updated,
            payload,
        }
    }

    /// Decode the payload. Returns `None` for malformed or empty events,
    /// which the dispatcher treats as a no-op rather than an error. A blank
    /// `text` counts as malformed: empty bodies are never persisted.
    pub fn message(&self) -> Option<Message> {
        if self.payload.is_null() {
            return None;
        }
        let message: Message = serde_json::from_value(self.payload.clone()).ok()?;
        if message.text.trim().is_empty() {
            return None;
        }
        Some(message)
    }
}

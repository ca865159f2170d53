//! Optimistic send coordination.
//!
//! Each submit is its own little state machine; there is no global submit
//! lock. An attempt owns the optimistic record shown to the UI and the
//! correlation key (its trimmed text) used to reconcile whichever arrives
//! first, the acknowledgment or a duplicate created-push.

use chatdesk_types::{Message, MessageStatus, Sender};
use chrono::Utc;

/// Lifecycle of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// The send is on the wire; the placeholder is visible.
    Submitting,
    /// A server-confirmed record superseded the placeholder.
    Confirmed,
    /// The transport gave up; the placeholder is re-marked Failed but kept
    /// visible until a late confirmation cleans it up.
    Failed,
}

/// One optimistic send.
#[derive(Debug, Clone)]
pub struct SendAttempt {
    record: Message,
    state: SendState,
}

impl SendAttempt {
    /// Gate from composing to submitting. Blank input never leaves the
    /// composing state; the caller gets nothing to track.
    pub fn begin(input: &str, sender: Sender) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            record: Message::placeholder(trimmed, sender),
            state: SendState::Submitting,
        })
    }

    /// The trimmed text, which doubles as the correlation key.
    pub fn text(&self) -> &str {
        &self.record.text
    }

    /// Current client-side version of the optimistic record.
    pub fn record(&self) -> &Message {
        &self.record
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn is_inflight(&self) -> bool {
        self.state == SendState::Submitting
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == SendState::Confirmed
    }

    /// Still waiting for a server record: in flight, or failed but possibly
    /// confirmed late by a push.
    pub fn awaits_confirmation(&self) -> bool {
        !self.is_confirmed()
    }

    pub fn settle_confirmed(&mut self) {
        self.state = SendState::Confirmed;
    }

    /// Re-mark the record Failed with a fresh timestamp so the freshness
    /// rule lets it replace the Sending version in place.
    pub fn settle_failed(&mut self) {
        self.state = SendState::Failed;
        self.record.status = MessageStatus::Failed;
        self.record.updated_at = Utc::now();
    }
}

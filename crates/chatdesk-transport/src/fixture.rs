//! In-process backend used by the demo binary and the integration tests.

use chatdesk_types::{Message, MessageEdge, MessagePage, MessageStatus, PageInfo, Sender};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{ChatTransport, PageRequest, PushFeeds, Result, TransportError};

const CURSOR_PREFIX: &str = "fx:";

fn encode_cursor(index: usize) -> String {
    format!("{}{}", CURSOR_PREFIX, index)
}

fn decode_cursor(cursor: &str) -> Result<usize> {
    cursor
        .strip_prefix(CURSOR_PREFIX)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| TransportError::Rejected {
            reason: format!("unknown cursor {:?}", cursor),
        })
}

struct Subscriber {
    created: mpsc::UnboundedSender<serde_json::Value>,
    updated: mpsc::UnboundedSender<serde_json::Value>,
}

struct FixtureState {
    history: Vec<Message>,
    next_id: u64,
    fail_sends: bool,
    fail_fetches: bool,
    send_delay: Option<std::time::Duration>,
    subscribers: Vec<Subscriber>,
}

impl Default for FixtureState {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            next_id: 1,
            fail_sends: false,
            fail_fetches: false,
            send_delay: None,
            subscribers: Vec::new(),
        }
    }
}

/// Stand-in for the real chat backend. Keeps a full message history, serves
/// cursor pagination over it, confirms sends, and fans push payloads out to
/// every subscriber. The failure switches and the raw push hooks let tests
/// play the part of a misbehaving producer: delayed acks, duplicate pushes,
/// stale timestamps, malformed payloads.
pub struct FixtureBackend {
    state: Mutex<FixtureState>,
    /// Whether a confirmed send also echoes a created push, as the real
    /// backend does. Tests that need to control event order turn this off
    /// and emit pushes by hand.
    auto_push: bool,
}

impl Default for FixtureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FixtureState::default()),
            auto_push: true,
        }
    }

    /// Fixture that never echoes pushes on its own.
    pub fn manual_push() -> Self {
        Self {
            auto_push: false,
            ..Self::new()
        }
    }

    /// Append history without emitting any events. Ids continue after the
    /// highest numeric id seeded.
    pub fn seed(&self, messages: Vec<Message>) {
        let mut state = self.state.lock();
        for message in &messages {
            if let Ok(numeric) = message.id.parse::<u64>() {
                state.next_id = state.next_id.max(numeric + 1);
            }
        }
        state.history.extend(messages);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.state.lock().fail_fetches = fail;
    }

    /// Delay acknowledgments so pushes can race ahead of them.
    pub fn set_send_delay(&self, delay: std::time::Duration) {
        self.state.lock().send_delay = Some(delay);
    }

    /// A message from the remote side: lands in history and is pushed to
    /// every subscriber as a created event.
    pub fn customer_says(&self, text: &str) -> Message {
        let message = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let message = Message::new(
                id.to_string(),
                text,
                MessageStatus::Sent,
                Utc::now(),
                Sender::Customer,
            );
            state.history.push(message.clone());
            message
        };
        self.push_created(serde_json::to_value(&message).unwrap_or(serde_json::Value::Null));
        message
    }

    /// Advance a stored message to Read and push the new version.
    pub fn mark_read(&self, id: &str) -> Option<Message> {
        let updated = {
            let mut state = self.state.lock();
            let message = state.history.iter_mut().find(|m| m.id == id)?;
            message.status = MessageStatus::Read;
            message.updated_at = Utc::now();
            message.clone()
        };
        self.push_updated(serde_json::to_value(&updated).unwrap_or(serde_json::Value::Null));
        Some(updated)
    }

    /// Fan a raw created payload out to every subscriber. Receivers that are
    /// gone are dropped silently; a departed consumer is not an error.
    pub fn push_created(&self, payload: serde_json::Value) {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|s| s.created.send(payload.clone()).is_ok());
    }

    /// Fan a raw updated payload out to every subscriber.
    pub fn push_updated(&self, payload: serde_json::Value) {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|s| s.updated.send(payload.clone()).is_ok());
    }
}

#[async_trait::async_trait]
impl ChatTransport for FixtureBackend {
    async fn fetch_page(&self, request: PageRequest) -> Result<MessagePage> {
        let state = self.state.lock();
        if state.fail_fetches {
            return Err(TransportError::ConnectionLost("fixture offline".into()));
        }

        let start = match &request.after {
            None => 0,
            Some(cursor) => decode_cursor(cursor)? + 1,
        };
        let count = request.count.max(1);
        let end = start.saturating_add(count).min(state.history.len());
        let start = start.min(end);

        let edges: Vec<MessageEdge> = state.history[start..end]
            .iter()
            .cloned()
            .enumerate()
            .map(|(offset, node)| MessageEdge::new(node, encode_cursor(start + offset)))
            .collect();

        let page_info = PageInfo {
            has_next_page: end < state.history.len(),
            has_previous_page: start > 0,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };

        debug!(start, end, "fixture served page");
        Ok(MessagePage::new(edges, page_info))
    }

    async fn send_message(&self, text: &str) -> Result<Message> {
        let (message, delay) = {
            let mut state = self.state.lock();
            if state.fail_sends {
                return Err(TransportError::ConnectionLost("fixture offline".into()));
            }
            let id = state.next_id;
            state.next_id += 1;
            let message = Message::new(
                id.to_string(),
                text,
                MessageStatus::Sent,
                Utc::now(),
                Sender::Admin,
            );
            state.history.push(message.clone());
            (message, state.send_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.auto_push {
            self.push_created(serde_json::to_value(&message)?);
        }
        Ok(message)
    }

    fn subscribe(&self) -> PushFeeds {
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        let (updated_tx, updated_rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(Subscriber {
            created: created_tx,
            updated: updated_tx,
        });
        PushFeeds {
            created: created_rx,
            updated: updated_rx,
        }
    }
}

//! ChatDesk Transport - the seam between the cache engine and the backend
//!
//! The engine never talks to a wire directly; it consumes this trait. A real
//! deployment implements it over whatever protocol the backend speaks. The
//! crate also ships `FixtureBackend`, an in-process implementation used by
//! the demo binary and the integration tests.

mod error;
mod fixture;

use async_trait::async_trait;
use chatdesk_types::{Message, MessagePage};
use tokio::sync::mpsc;

pub use error::{Result, TransportError};
pub use fixture::FixtureBackend;

/// Parameters for one paginated read. `after` carries the end cursor of the
/// previous window when extending it.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub count: usize,
    pub after: Option<String>,
}

impl PageRequest {
    pub fn first(count: usize) -> Self {
        Self { count, after: None }
    }

    pub fn after(count: usize, cursor: impl Into<String>) -> Self {
        Self {
            count,
            after: Some(cursor.into()),
        }
    }
}

/// The two push streams. Each may fire zero or more times, in any order, at
/// any rate, including after the consumer is gone; payloads are raw JSON and
/// may be malformed. Dropping the receivers is the only teardown needed.
pub struct PushFeeds {
    pub created: mpsc::UnboundedReceiver<serde_json::Value>,
    pub updated: mpsc::UnboundedReceiver<serde_json::Value>,
}

/// Everything the client engine consumes from the backend.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Fetch one window of messages.
    async fn fetch_page(&self, request: PageRequest) -> Result<MessagePage>;

    /// Submit a message body; resolves to the server-confirmed record.
    async fn send_message(&self, text: &str) -> Result<Message>;

    /// Open the created/updated push streams for one consumer.
    fn subscribe(&self) -> PushFeeds;
}

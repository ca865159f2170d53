use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix marking client-generated placeholder ids. A record whose id carries
/// this prefix has never been seen by the server.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Authorship side of a message. Admin is the local actor in this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Admin,
    Customer,
}

impl Sender {
    /// Whether this side is the one running the client.
    pub fn is_local(&self) -> bool {
        matches!(self, Sender::Admin)
    }
}

/// Delivery state of a message. Advances Sending -> Sent -> Read in the
/// common case, but nothing downstream may assume monotonicity from an
/// untrusted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Read,
    Failed,
}

/// A single chat message, immutable per version. `updated_at` is the sole
/// freshness signal available for conflict arbitration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub status: MessageStatus,
    pub updated_at: DateTime<Utc>,
    pub sender: Sender,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        status: MessageStatus,
        updated_at: DateTime<Utc>,
        sender: Sender,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            status,
            updated_at,
            sender,
        }
    }

    /// Placeholder synthesized at submit time, before the server has seen the
    /// send. Lives only client-side until evicted by a confirmed record.
    pub fn placeholder(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            text: text.into(),
            status: MessageStatus::Sending,
            updated_at: Utc::now(),
            sender,
        }
    }

    /// True for client-generated ids not yet confirmed by the server.
    pub fn is_temp(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

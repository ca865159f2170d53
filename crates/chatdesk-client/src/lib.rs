//! ChatDesk Client - session loop, optimistic sends, and the UI surface
//!
//! Ties the workspace together: one single-writer session task serializes
//! page fetches, send acknowledgments, and the two push streams through the
//! cache, and publishes immutable snapshots the UI consumes reactively.

mod config;
mod send;
mod service;
mod session;

pub use config::Config;
pub use send::{SendAttempt, SendState};
pub use service::ChatClientService;
pub use session::{ChatHandle, ChatSession, ChatSnapshot, SessionCommand, SessionOptions};

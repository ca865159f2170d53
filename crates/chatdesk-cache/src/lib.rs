//! ChatDesk Cache - message store and reconciliation engine
//!
//! Holds the client-side window of paginated chat messages and the merge
//! rules that keep it consistent while data arrives from divergent,
//! unordered channels: paginated fetches, send acknowledgments, and push
//! events. Three primitives do all the work:
//!
//! - `merge_pages` extends or replaces the window when a fetch lands
//! - `upsert_by_freshness` inserts or conditionally replaces a single record,
//!   arbitrated only by `updated_at`
//! - `evict_placeholders` removes optimistic placeholders once the server
//!   confirms the send they stood in for
//!
//! All three are synchronous, in-memory transformations. Concurrency control
//! lives entirely in `MessageStore`, whose write lock is the single commit
//! point every caller serializes through.

mod reconcile;
mod store;

pub use reconcile::{
    apply_confirmed, evict_placeholders, merge_pages, upsert_by_freshness, MergeDirection,
    UpsertOutcome,
};
pub use store::MessageStore;

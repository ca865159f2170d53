//! Pure merge functions for the message window.
//!
//! Everything here takes the current state plus one delta and produces the
//! next state. No I/O, no clocks, no channels: callers decide when a result
//! becomes visible by committing it through the store.

use chatdesk_types::{Message, MessageEdge, MessagePage, PageInfo};
use tracing::debug;

/// Which way a freshly fetched window extends the cached one. Naming follows
/// conceptual scroll direction, not literal array order: Forward is "load
/// older via after-cursor", Backward is "load newer via before-cursor".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    /// First load or forced reload; the incoming window replaces the cache.
    Initial,
    /// Incoming edges append at the tail; the forward frontier moves.
    Forward,
    /// Incoming edges prepend at the head; the forward frontier stays put.
    Backward,
}

/// What `upsert_by_freshness` did with an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No edge carried the id; a new edge was appended at the tail.
    Inserted,
    /// An edge carried the id and the incoming version was at least as fresh.
    Replaced,
    /// The stored version was strictly newer; the incoming one was dropped.
    SuppressedStale,
}

/// Merge a fetched window into the cached one.
///
/// No id-level deduplication happens here: adjacent windows are trusted to be
/// disjoint. Cross-window duplicates are resolved later, record by record, by
/// `upsert_by_freshness`.
pub fn merge_pages(
    existing: Option<MessagePage>,
    incoming: MessagePage,
    direction: MergeDirection,
) -> MessagePage {
    let Some(existing) = existing else {
        return incoming;
    };

    match direction {
        MergeDirection::Initial => incoming,
        MergeDirection::Forward => {
            let mut edges = existing.edges;
            edges.extend(incoming.edges);
            MessagePage::new(edges, incoming.page_info)
        }
        MergeDirection::Backward => {
            let mut edges = incoming.edges;
            edges.extend(existing.edges);
            // The forward frontier does not move when loading backward.
            let page_info = PageInfo {
                has_next_page: existing.page_info.has_next_page,
                end_cursor: existing.page_info.end_cursor,
                has_previous_page: incoming.page_info.has_previous_page,
                start_cursor: incoming.page_info.start_cursor,
            };
            MessagePage::new(edges, page_info)
        }
    }
}

/// Insert-or-replace keyed by id, arbitrated solely by `updated_at`.
///
/// Equal timestamps go to the incoming record (>=, not >): the ack path and
/// the push path can deliver numerically identical timestamps for the same
/// logical update, and both must land for either path to be idempotent.
pub fn upsert_by_freshness(page: &mut MessagePage, incoming: Message) -> UpsertOutcome {
    match page.position_of(&incoming.id) {
        None => {
            page.edges.push(MessageEdge::synthesized(incoming));
            UpsertOutcome::Inserted
        }
        Some(index) => {
            let existing = &page.edges[index].node;
            if incoming.updated_at < existing.updated_at {
                debug!(
                    id = %incoming.id,
                    incoming = %incoming.updated_at,
                    stored = %existing.updated_at,
                    "suppressed stale update"
                );
                return UpsertOutcome::SuppressedStale;
            }
            // Node swaps in place; position and cursor are preserved.
            page.edges[index].node = incoming;
            UpsertOutcome::Replaced
        }
    }
}

/// Remove every optimistic placeholder whose text equals the submitted text.
/// Returns the number of evicted edges.
///
/// Text equality is the only correlation key available, so a double submit of
/// identical text evicts both placeholders; they collapse onto the single
/// confirmed record. Placeholders carrying different text belong to other
/// in-flight sends and are never touched.
pub fn evict_placeholders(page: &mut MessagePage, text: &str) -> usize {
    let before = page.edges.len();
    page.edges
        .retain(|edge| !(edge.node.is_temp() && edge.node.text == text));
    before - page.edges.len()
}

/// Reconcile a server-confirmed message against the placeholder it
/// supersedes: eviction first, then upsert, so the confirmed record lands as
/// a fresh edge (or merges with a server-origin duplicate) instead of
/// colliding with the placeholder.
pub fn apply_confirmed(
    page: &mut MessagePage,
    submitted_text: &str,
    confirmed: Message,
) -> UpsertOutcome {
    let evicted = evict_placeholders(page, submitted_text);
    if evicted > 0 {
        debug!(count = evicted, id = %confirmed.id, "evicted optimistic placeholders");
    }
    upsert_by_freshness(page, confirmed)
}

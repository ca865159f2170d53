use chatdesk_types::MessagePage;
use parking_lot::RwLock;

use crate::reconcile::{merge_pages, MergeDirection};

/// The single source of truth the UI reads from.
///
/// One logical writer (the session loop) funnels every mutation through
/// `replace`, `merge`, or `update`; the write lock is the atomic commit
/// point, so readers never observe a half-merged window. The page slot stays
/// absent until the first load lands.
#[derive(Debug, Default)]
pub struct MessageStore {
    page: RwLock<Option<MessagePage>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current materialized window, absent before the first load.
    pub fn page(&self) -> Option<MessagePage> {
        self.page.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.page.read().is_some()
    }

    /// Atomic swap of the whole window.
    pub fn replace(&self, page: MessagePage) {
        *self.page.write() = Some(page);
    }

    /// Merge a fetched window in the given direction and commit the result.
    pub fn merge(&self, incoming: MessagePage, direction: MergeDirection) {
        let mut slot = self.page.write();
        let merged = merge_pages(slot.take(), incoming, direction);
        *slot = Some(merged);
    }

    /// Serialized read-modify-write of the full page. Returns `None` when the
    /// store has not been loaded yet; the caller decides whether that is
    /// worth reporting.
    pub fn update<T>(&self, apply: impl FnOnce(&mut MessagePage) -> T) -> Option<T> {
        let mut slot = self.page.write();
        slot.as_mut().map(apply)
    }
}

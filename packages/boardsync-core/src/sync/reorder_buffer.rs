/// Reorder event buffer: coalesces bursts of remote reorders.
///
/// Incoming updates are appended to a pending list and the deadline is
/// re-armed on every arrival. When the deadline passes, the owner calls
/// `flush`, which applies the whole list to the cache in one pass.
/// The buffer holds no timer of its own; the session sleeps until
/// `deadline()`.
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::PageCache;
use crate::types::PositionUpdate;

#[derive(Debug)]
pub struct ReorderBuffer {
    window: Duration,
    pending: Vec<PositionUpdate>,
    deadline: Option<Instant>,
}

impl ReorderBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Queue a burst and re-arm the deadline to `now + window`.
    pub fn push(&mut self, items: Vec<PositionUpdate>, now: Instant) {
        self.pending.extend(items);
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |d| d <= now)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply everything pending in one cache pass and clear the deadline.
    /// Returns how many cards changed; an empty list is a no-op.
    pub fn flush(&mut self, cache: &mut PageCache) -> usize {
        self.deadline = None;
        if self.pending.is_empty() {
            return 0;
        }
        let items = std::mem::take(&mut self.pending);
        let changed = cache.apply_positions(&items);
        log::debug!(
            "[boardsync.reorder_buffer] Applied {} buffered update(s), {} card(s) moved",
            items.len(),
            changed
        );
        changed
    }

    /// Drop pending updates without applying them (query change, shutdown).
    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }
}

//! Resume cursor: the last confirmed block a session should resume from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, monotonic block cursor.
///
/// Advanced only by control-channel confirmations. Cloning yields another
/// handle onto the same position, so the `Subscription` handle can observe
/// what the session task has committed.
#[derive(Debug, Clone, Default)]
pub struct ResumeCursor {
    block: Arc<AtomicU64>,
}

impl ResumeCursor {
    /// Create a cursor at the given starting block.
    pub fn new(from_block: u64) -> Self {
        Self {
            block: Arc::new(AtomicU64::new(from_block)),
        }
    }

    /// Current committed block.
    pub fn get(&self) -> u64 {
        self.block.load(Ordering::Acquire)
    }

    /// Move the cursor to `block` if it is ahead. Returns the resulting position.
    pub fn advance(&self, block: u64) -> u64 {
        let prev = self.block.fetch_max(block, Ordering::AcqRel);
        prev.max(block)
    }

    /// Advance from an optional confirmation; `None` leaves the cursor in place.
    pub fn observe(&self, block: Option<u64>) -> u64 {
        match block {
            Some(b) => self.advance(b),
            None => self.get(),
        }
    }
}

use std::sync::atomic::{AtomicI64, Ordering};

use super::Clock;

/// A clock whose time only moves when told to.
///
/// `sleep` advances the offset instead of blocking, which is what makes
/// time-window tests deterministic.
pub struct Mock {
    offset_ms: AtomicI64,
}

impl Mock {
    pub fn new(offset_ms: i64) -> Mock {
        Mock {
            offset_ms: AtomicI64::new(offset_ms),
        }
    }

    /// Moves time forward by `ms` milliseconds.
    pub fn advance(&self, ms: i64) {
        self.offset_ms.fetch_add(ms, Ordering::Release);
    }
}

impl Clock for Mock {
    fn now_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    fn sleep(&self, ms: u64) {
        self.advance(ms as i64);
    }
}

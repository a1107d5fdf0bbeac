use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::Clock;

/// The production clock source.
///
/// Reads a high-resolution monotonic counter and anchors it to the wall-clock
/// time captured at construction, so `now_ms` values look like epoch
/// milliseconds but can never run backward.
pub struct Monotonic {
    clock: quanta::Clock,
    anchor: quanta::Instant,
    origin_ms: i64,
}

impl Monotonic {
    pub fn new() -> Monotonic {
        let clock = quanta::Clock::new();
        let anchor = clock.now();
        let origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Monotonic {
            clock,
            anchor,
            origin_ms,
        }
    }
}

impl Default for Monotonic {
    fn default() -> Monotonic {
        Monotonic::new()
    }
}

impl Clock for Monotonic {
    fn now_ms(&self) -> i64 {
        let elapsed = self.clock.now().duration_since(self.anchor);
        self.origin_ms + elapsed.as_millis() as i64
    }

    fn sleep(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

use std::sync::Arc;

mod monotonic;
pub use self::monotonic::Monotonic;
mod mock;
pub use self::mock::Mock;

/// A monotonic millisecond time source.
///
/// Every component of a registry consults the same clock instance, so swapping
/// in a [`Mock`] makes windowing behavior fully deterministic under test.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds. Never runs backward.
    fn now_ms(&self) -> i64;

    /// Blocks (or, for a mock, advances) for the given number of milliseconds.
    fn sleep(&self, ms: u64);
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }

    fn sleep(&self, ms: u64) {
        (**self).sleep(ms)
    }
}

//! Capped exponential backoff used to pace pool restarts and job retries.
//!
//! Growing past the maximum does not clamp: the current delay drops back to
//! the base and the sequence starts over.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tracing::trace;

/// Exponential delay generator safe for concurrent use.
///
/// Every field is its own atomic, so callers updating different fields never
/// contend with each other.
#[derive(Debug)]
pub struct Backoff {
    base: AtomicU64,
    max: AtomicU64,
    current: AtomicU64,
    factor: AtomicU32,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Backoff {
    /// Create a backoff starting at `base`.
    pub fn new(base: Duration, max: Duration, factor: u32) -> Self {
        Self {
            base: AtomicU64::new(nanos(base)),
            max: AtomicU64::new(nanos(max)),
            current: AtomicU64::new(nanos(base)),
            factor: AtomicU32::new(factor),
        }
    }

    pub fn base(&self) -> Duration {
        Duration::from_nanos(self.base.load(Ordering::SeqCst))
    }

    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.max.load(Ordering::SeqCst))
    }

    pub fn factor(&self) -> u32 {
        self.factor.load(Ordering::SeqCst)
    }

    /// The delay the next `sleep` waits for.
    pub fn current(&self) -> Duration {
        Duration::from_nanos(self.current.load(Ordering::SeqCst))
    }

    /// Replace the base delay and restart the sequence from it.
    pub fn set_base(&self, base: Duration) {
        self.base.store(nanos(base), Ordering::SeqCst);
        self.reset();
    }

    pub fn set_max(&self, max: Duration) {
        self.max.store(nanos(max), Ordering::SeqCst);
    }

    /// Multiply the current delay by the factor, starting over from the base
    /// when the result would exceed the maximum.
    pub fn increase_timeout(&self) {
        let next = self
            .current
            .load(Ordering::SeqCst)
            .saturating_mul(u64::from(self.factor()));
        if next > self.max.load(Ordering::SeqCst) {
            self.reset();
        } else {
            self.current.store(next, Ordering::SeqCst);
        }
        trace!(current_ms = self.current().as_millis(), "Backoff increased");
    }

    /// Return the current delay to the base.
    pub fn reset(&self) {
        self.current
            .store(self.base.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    /// Wait for the current delay.
    ///
    /// Not cancellable on its own; callers that need to react to a stop
    /// request race this against it with `tokio::select!`.
    pub async fn sleep(&self) {
        tokio::time::sleep(self.current()).await;
    }
}

impl Clone for Backoff {
    fn clone(&self) -> Self {
        Self {
            base: AtomicU64::new(self.base.load(Ordering::SeqCst)),
            max: AtomicU64::new(self.max.load(Ordering::SeqCst)),
            current: AtomicU64::new(self.current.load(Ordering::SeqCst)),
            factor: AtomicU32::new(self.factor()),
        }
    }
}

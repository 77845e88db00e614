//! Overlap guard for periodic pool work.
//!
//! A health sweep that outlives the check interval must not be joined by a
//! second sweep; the next tick is skipped instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether a guarded piece of work is in flight.
///
/// Acquisition is lock-free and hands out a `RunGuard` that clears the flag
/// when dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct OverlapGuard {
    is_running: Arc<AtomicBool>,
}

impl OverlapGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(RunGuard)` if no other holder exists, `None` if the
    /// work should be skipped.
    pub(crate) fn try_acquire(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: self.is_running.clone(),
            })
    }
}

/// RAII guard that releases the running flag when dropped, including when
/// the guarded task panics.
#[derive(Debug)]
pub(crate) struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

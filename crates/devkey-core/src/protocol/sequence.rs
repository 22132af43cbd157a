//! Correlation ids for request/reply pairs on the IPC channel.
//!
//! Every outbound `KeyEvent` and every platform `DispatchKeyEvent` carries a
//! `seq`; the peer echoes it in the reply so the sender can find the waiting
//! request.  Ids only need to be unique among requests in flight on one
//! connection, so a wrapping atomic counter is enough.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free, wrapping counter that hands out request correlation ids.
///
/// # Examples
///
/// ```rust
/// use devkey_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next id.  Wraps from `u64::MAX` to 0.
    pub fn next(&self) -> u64 {
        // Ids are correlation tokens only; no memory is published through them.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }
}

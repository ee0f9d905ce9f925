//! # Global Buffer Guard
//!
//! Tracks the bytes held in partial-frame buffers across every live session.
//! Each [`crate::protocol::FrameAssembler`] charges the guard as fragments
//! arrive and releases its share once the message parses, the buffer is
//! dropped on overflow, or the session ends.
//!
//! ## Core Functionality:
//!
//! - **Atomic Accounting**: `current_usage` is an `AtomicU64`, so sessions on
//!   different worker threads update it without a lock.
//!
//! - **Signal, not enforcement**: the guard never blocks. `increment` returns
//!   `false` once the budget is breached and the caller decides what to drop.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};

/// Default process-wide budget for partial-frame buffers.
pub const DEFAULT_TOTAL_BUFFER_BUDGET: u64 = 256 * 1024 * 1024;

/// # Buffer Guard
///
/// A shared counter of buffered inbound bytes with a fixed capacity.
#[derive(Debug)]
pub struct BufferGuard {
    /// Maximum bytes all sessions may hold in partial frames combined.
    capacity: u64,
    current_usage: AtomicU64,
}

impl BufferGuard {
    /// Creates a guard with a fixed capacity.
    ///
    /// # Example
    /// ```rust
    /// use std::sync::Arc;
    /// use lib_rtdb::core::memory_guard::BufferGuard;
    ///
    /// let guard = Arc::new(BufferGuard::new(64 * 1024 * 1024));
    /// assert!(guard.increment(1024));
    /// ```
    pub fn new(max_bytes: u64) -> Self {
        Self {
            capacity: max_bytes,
            current_usage: AtomicU64::new(0),
        }
    }

    /// Records `bytes` of newly buffered data.
    ///
    /// The bytes are counted even when the budget is breached; the caller
    /// releases them through [`BufferGuard::decrement`] when it drops the buffer.
    ///
    /// # Returns
    /// - `true` if the new total is within `capacity`.
    /// - `false` if the total has exceeded `capacity`.
    pub fn increment(&self, bytes: u64) -> bool {
        // `fetch_add` returns the value before the addition.
        let prev = self.current_usage.fetch_add(bytes, Ordering::Relaxed);
        prev + bytes <= self.capacity
    }

    /// Releases `bytes` previously recorded with `increment`.
    pub fn decrement(&self, bytes: u64) {
        self.current_usage.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Current total of buffered bytes.
    pub fn current_usage(&self) -> u64 {
        self.current_usage.load(Ordering::Relaxed)
    }

    /// The configured budget, in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl Default for BufferGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_BUFFER_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_within_capacity() {
        let guard = BufferGuard::new(100);
        assert!(guard.increment(60));
        assert!(guard.increment(40));
        assert_eq!(guard.current_usage(), 100);
        assert!(!guard.increment(1));
    }

    #[test]
    fn test_breach_still_counts_bytes() {
        let guard = BufferGuard::new(10);
        assert!(!guard.increment(11));
        assert_eq!(guard.current_usage(), 11);
        guard.decrement(11);
        assert_eq!(guard.current_usage(), 0);
    }
}

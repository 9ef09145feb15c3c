//! Type aliases for the thread-safe wrappers used by the link handle.
//!
//! The link is shared between producer threads, observer callbacks and the
//! single pump worker, so every piece of mutable state sits behind one of
//! these wrappers. All locks are `parking_lot` locks: no poisoning, and
//! guards are never held across an `.await`.
//!
//! ```rust,ignore
//! use grblstream_core::types::*;
//!
//! let queue: ThreadSafeDeque<Vec<u8>> = thread_safe_deque();
//! queue.lock().push_back(b"G0X1\n".to_vec());
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe deque for multi-producer queues.
pub type ThreadSafeDeque<T> = Arc<Mutex<VecDeque<T>>>;

/// A thread-safe reader-writer lock wrapper for read-heavy state.
///
/// Snapshots are taken far more often than the state is folded.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Create a new empty `ThreadSafeDeque<T>`.
#[inline]
pub fn thread_safe_deque<T>() -> ThreadSafeDeque<T> {
    Arc::new(Mutex::new(VecDeque::new()))
}

/// Create a new `ThreadSafeRw<T>` from a value.
#[inline]
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

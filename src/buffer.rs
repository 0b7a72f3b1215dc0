//! Bounded drop-oldest channel between a capture worker and its sessions
//!
//! The queue itself is a lock-free `ArrayQueue`; the mutex/condvar pair is
//! only used to park consumers while the queue is empty.

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO that overwrites its oldest item when full.
///
/// One producer pushes; any number of consumers compete in [`pop`], so each
/// item is handed to at most one of them.
///
/// [`pop`]: BoundedChannel::pop
pub struct BoundedChannel<T> {
    queue: ArrayQueue<T>,
    lock: Mutex<()>,
    available: Condvar,
    pushed: AtomicU64,
    evicted: AtomicU64,
    popped: AtomicU64,
    timeouts: AtomicU64,
}

impl<T> BoundedChannel<T> {
    /// Create a new channel with the specified capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be non-zero");

        Self {
            queue: ArrayQueue::new(capacity),
            lock: Mutex::new(()),
            available: Condvar::new(),
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// Push an item, evicting the oldest one if the channel is full.
    ///
    /// Never blocks. Returns the evicted item, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = self.queue.force_push(item);
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }

        // Taking the lock orders this notify after any consumer's empty check
        let _guard = self.lock.lock();
        self.available.notify_one();

        evicted
    }

    /// Wait up to `timeout` for the oldest item.
    ///
    /// Returns `None` only after the whole timeout has elapsed without an
    /// item becoming available to this caller.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            let mut guard = self.lock.lock();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            if self.available.wait_until(&mut guard, deadline).timed_out() {
                drop(guard);
                return match self.try_pop() {
                    Some(item) => Some(item),
                    None => {
                        self.timeouts.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                };
            }
        }
    }

    /// Take the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        let item = self.queue.pop();
        if item.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Get statistics
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            len: self.len(),
            capacity: self.capacity(),
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Channel statistics
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub evicted: u64,
    pub popped: u64,
    pub timeouts: u64,
}

impl ChannelStats {
    /// Fraction of pushed items that were overwritten before anyone read them
    pub fn drop_rate(&self) -> f32 {
        if self.pushed == 0 {
            0.0
        } else {
            self.evicted as f32 / self.pushed as f32
        }
    }
}

/// Thread-safe handle to a channel
pub type SharedChannel<T> = Arc<BoundedChannel<T>>;

/// Create a new shared channel
pub fn create_shared_channel<T>(capacity: usize) -> SharedChannel<T> {
    Arc::new(BoundedChannel::new(capacity))
}

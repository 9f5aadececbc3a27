use crate::record::LogEntry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

/// Fixed-capacity multi-producer / single-consumer buffer between the
/// logging call sites and the dispatcher.
///
/// `enqueue` never blocks on I/O and never fails: when the buffer is full
/// the oldest entry is evicted to make room for the newest one. The lock
/// is only held for a `VecDeque` push/pop, so producers never wait on the
/// dispatcher's network activity.
pub struct BoundedQueue {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
    /// Entries evicted by the drop-oldest policy.
    dropped: AtomicU64,
    /// Entries discarded because the queue was already closed.
    rejected: AtomicU64,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Buffer an entry, evicting the oldest one if the queue is full.
    /// No-op once the queue has been closed.
    pub fn enqueue(&self, entry: LogEntry) {
        if self.closed.load(Ordering::Acquire) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        {
            let mut entries = self.entries.lock();
            if entries.len() >= self.capacity {
                entries.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            entries.push_back(entry);
        }

        self.notify.notify_one();
    }

    /// Remove and return up to `max` buffered entries, oldest first.
    pub fn drain(&self, max: usize) -> Vec<LogEntry> {
        let mut entries = self.entries.lock();
        let n = max.min(entries.len());
        entries.drain(..n).collect()
    }

    /// Wait until at least one entry is buffered or the queue is closed.
    pub async fn wait_for_data(&self) {
        loop {
            // Register interest before checking so a concurrent enqueue
            // between the check and the await is not missed.
            let notified = self.notify.notified();
            if !self.is_empty() || self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting new entries. Already-buffered entries stay drainable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries evicted by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of entries discarded because they arrived after `close`.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

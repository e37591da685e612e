//! Thread-safe FIFO between the generator and the collectors.
//!
//! Consumers that find the queue empty can either return immediately
//! ([`ConcurrentQueue::pop`]) or park on a condition variable for a bounded time
//! ([`ConcurrentQueue::pop_timeout`]), which avoids spinning while still
//! letting them notice a stop request within one poll interval.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tick_core::Record;

/// Unbounded multi-producer multi-consumer queue.
#[derive(Debug)]
pub struct ConcurrentQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

/// Queue carrying generated records to the collectors.
pub type RecordQueue = ConcurrentQueue<Record>;

impl<T> ConcurrentQueue<T> {
    /// Empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Remove the oldest item, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Like [`pop`](Self::pop), but waits up to `timeout` for an item.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wake every consumer parked in [`pop_timeout`](Self::pop_timeout).
    ///
    /// Used on shutdown so waiters re-check the run signal without sitting
    /// out their full timeout.
    pub fn wake_all(&self) {
        // Taking the lock orders this notify after any in-progress wait setup.
        drop(self.items.lock());
        self.available.notify_all();
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = ConcurrentQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 5);
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let queue: ConcurrentQueue<u32> = ConcurrentQueue::new();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_pop_timeout_expires() {
        let queue: ConcurrentQueue<u32> = ConcurrentQueue::new();
        let started = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(ConcurrentQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(42);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_concurrent_consumers_receive_each_item_once() {
        let queue = Arc::new(ConcurrentQueue::new());
        for i in 0..1_000u32 {
            queue.push(i);
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || std::iter::from_fn(|| queue.pop()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for consumer in consumers {
            for item in consumer.join().unwrap() {
                assert!(seen.insert(item), "item {item} delivered twice");
            }
        }
        assert_eq!(seen.len(), 1_000);
    }
}

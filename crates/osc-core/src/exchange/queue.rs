//! Swap-drain queue shared between a producer thread and a consumer thread.
//!
//! # What is swap-drain? (for beginners)
//!
//! The obvious way to consume a shared queue is to lock it, pop one item,
//! unlock, and repeat.  Every pop takes the lock again, and while the consumer
//! is busy the producer keeps contending for it.
//!
//! Swap-drain takes the lock **once**, exchanges the whole `Vec` with an empty
//! one (`std::mem::take`, a pointer swap), and releases the lock.  The consumer
//! then walks the swapped-out `Vec` at its leisure without holding anything.
//! Producers are blocked for O(1) regardless of how deep the queue is.
//!
//! # Known limitation
//!
//! The queue is unbounded.  The design relies on the consumer polling often
//! enough; under sustained overload memory grows.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A mutex-guarded FIFO sequence drained by atomic swap-with-empty.
///
/// # Examples
///
/// ```rust
/// use osc_core::ExchangeQueue;
///
/// let q = ExchangeQueue::new();
/// q.push(1);
/// q.push(2);
/// assert_eq!(q.drain(), vec![1, 2]);
/// assert!(q.drain().is_empty());
/// ```
#[derive(Debug)]
pub struct ExchangeQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> ExchangeQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Appends `item` at the back of the queue.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Appends every item of `items`, in order, under a single lock.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.lock().extend(items);
    }

    /// Swaps the queued items out and returns them in enqueue order.
    ///
    /// Items pushed after the swap are not included; they show up on the next
    /// call.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Moves every queued item onto the end of `out`.
    ///
    /// The swap happens under the lock; the append into `out` happens after
    /// the lock is released.
    pub fn drain_into(&self, out: &mut Vec<T>) {
        let mut drained = self.drain();
        if out.is_empty() {
            *out = drained;
        } else {
            out.append(&mut drained);
        }
    }

    /// Current depth of the queue.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while the lock is held cannot leave a `Vec` half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ExchangeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Counts how many times it has been dropped.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drain_preserves_enqueue_order() {
        // Arrange
        let q = ExchangeQueue::new();
        q.push("p1");
        q.push("p2");
        q.push("p3");

        // Act
        let drained = q.drain();

        // Assert
        assert_eq!(drained, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_drain_leaves_queue_empty() {
        let q = ExchangeQueue::new();
        q.push(1);
        let _ = q.drain();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_items_pushed_after_drain_appear_on_next_drain() {
        // Arrange
        let q = ExchangeQueue::new();
        q.push(1);
        q.push(2);

        // Act
        let first = q.drain();
        q.push(3);
        let second = q.drain();

        // Assert
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
    }

    #[test]
    fn test_extend_appends_batch_in_order() {
        let q = ExchangeQueue::new();
        q.push(0);
        q.extend([1, 2, 3]);
        assert_eq!(q.drain(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drain_into_appends_to_existing_output() {
        // Arrange
        let q = ExchangeQueue::new();
        q.extend([3, 4]);
        let mut out = vec![1, 2];

        // Act
        q.drain_into(&mut out);

        // Assert
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_every_item_is_dropped_exactly_once() {
        // Arrange
        let drops = Arc::new(AtomicUsize::new(0));
        let q = ExchangeQueue::new();
        for _ in 0..10 {
            q.push(DropCounter(Arc::clone(&drops)));
        }

        // Act – consume half, abandon the rest with the queue
        let drained = q.drain();
        for _ in 0..5 {
            q.push(DropCounter(Arc::clone(&drops)));
        }
        drop(drained);
        drop(q);

        // Assert
        assert_eq!(drops.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_concurrent_pushes_are_never_lost_or_duplicated() {
        // Arrange
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;
        let q = Arc::new(ExchangeQueue::new());

        // Act – producers push while the consumer keeps draining
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push((p, i));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while seen.len() < PRODUCERS * PER_PRODUCER {
            q.drain_into(&mut seen);
            thread::yield_now();
        }
        for h in handles {
            h.join().unwrap();
        }
        q.drain_into(&mut seen);

        // Assert – every item exactly once, and per-producer order preserved
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
        for p in 0..PRODUCERS {
            let from_p: Vec<usize> = seen
                .iter()
                .filter(|(src, _)| *src == p)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(from_p, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
    }
}

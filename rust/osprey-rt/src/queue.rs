//! Blocking FIFO queue feeding the dispatcher.
//!
//! The [`ReadyQueue`] is a `Mutex<VecDeque<T>>` paired with a [`Condvar`].
//! Producers (`submit`, batch generator, preempting workers) push to the
//! tail; the dispatcher blocks in [`wait_and_pop`](ReadyQueue::wait_and_pop)
//! until an item or a shutdown arrives. Shutdown is sticky: once requested,
//! already-enqueued items are still delivered in order, and only then does
//! the queue report the shutdown sentinel (`None`).
//!
//! Cloning a `ReadyQueue` produces a new handle to the *same* underlying
//! queue (backed by `Arc`).

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

/// A shutdown-aware blocking FIFO of handles.
pub struct ReadyQueue<T> {
    inner: Arc<Shared<T>>,
}

impl<T> Clone for ReadyQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadyQueue<T> {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::new(),
                    shutdown: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueue a value at the tail and wake one waiter.
    ///
    /// Pushes after [`shutdown`](ReadyQueue::shutdown) are dropped;
    /// producers are expected to have ceased by then, so a late push is a
    /// shutdown race, not new work.
    pub fn push(&self, value: T) {
        let mut state = self.inner.state.lock().unwrap();
        if state.shutdown {
            return;
        }
        state.items.push_back(value);
        self.inner.available.notify_one();
    }

    /// Block until an item is available or the queue is shut down.
    ///
    /// Returns `None` only when shutdown has been requested *and* every
    /// previously-enqueued item has been delivered.
    pub fn wait_and_pop(&self) -> Option<T> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(value) = state.items.pop_front() {
                return Some(value);
            }
            if state.shutdown {
                return None;
            }
            state = self.inner.available.wait(state).unwrap();
        }
    }

    /// Pop without blocking. `None` means "nothing queued right now".
    pub fn try_pop(&self) -> Option<T> {
        self.inner.state.lock().unwrap().items.pop_front()
    }

    /// Request shutdown and wake every waiter.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.shutdown = true;
        self.inner.available.notify_all();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().unwrap().shutdown
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().items.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().unwrap().items.is_empty()
    }
}

impl<T> fmt::Debug for ReadyQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("ReadyQueue")
            .field("len", &state.items.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn delivers_in_fifo_order() {
        let q = ReadyQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.wait_and_pop(), Some(1));
        assert_eq!(q.wait_and_pop(), Some(2));
        assert_eq!(q.wait_and_pop(), Some(3));
    }

    #[test]
    fn wait_and_pop_blocks_until_push() {
        let q = ReadyQueue::new();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.wait_and_pop())
        };
        // Give the consumer a moment to reach the wait.
        thread::sleep(Duration::from_millis(20));
        q.push(99);
        assert_eq!(consumer.join().unwrap(), Some(99));
    }

    #[test]
    fn shutdown_drains_before_sentinel() {
        let q = ReadyQueue::new();
        q.push("a");
        q.push("b");
        q.shutdown();
        assert_eq!(q.wait_and_pop(), Some("a"));
        assert_eq!(q.wait_and_pop(), Some("b"));
        assert_eq!(q.wait_and_pop(), None);
        // The sentinel repeats on subsequent calls.
        assert_eq!(q.wait_and_pop(), None);
    }

    #[test]
    fn shutdown_wakes_blocked_waiters() {
        let q: ReadyQueue<u32> = ReadyQueue::new();
        let mut consumers = Vec::new();
        for _ in 0..3 {
            let q = q.clone();
            consumers.push(thread::spawn(move || q.wait_and_pop()));
        }
        thread::sleep(Duration::from_millis(20));
        q.shutdown();
        for c in consumers {
            assert_eq!(c.join().unwrap(), None);
        }
    }

    #[test]
    fn push_after_shutdown_is_dropped() {
        let q = ReadyQueue::new();
        q.shutdown();
        q.push(1);
        assert!(q.is_empty());
        assert_eq!(q.wait_and_pop(), None);
    }

    #[test]
    fn clones_share_the_queue() {
        let q = ReadyQueue::new();
        let q2 = q.clone();
        q.push(7);
        assert_eq!(q2.len(), 1);
        assert_eq!(q2.try_pop(), Some(7));
        assert!(q.is_empty());
    }

    #[test]
    fn try_pop_does_not_block() {
        let q: ReadyQueue<u32> = ReadyQueue::new();
        assert_eq!(q.try_pop(), None);
    }
}

//! Bounded-unbounded FIFO of byte payloads with blocking `get`, timed `wait`,
//! and a sticky terminating `clear`.
//!
//! Grounded on `Core/MessageQueue.{h,cpp}`, with one deliberate correction:
//! the original carries a `// FIXME(strager): This class does not handle
//! spurious wakeups!` comment on its condvar wait loop. This port recomputes
//! its wake condition on every loop iteration instead of trusting a single
//! wake, so a spurious wakeup just re-checks and re-waits.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Inner {
    items: VecDeque<Vec<u8>>,
    terminated: bool,
}

/// A condvar-backed FIFO queue, the sole cross-thread conduit between a
/// [`crate::queue_channel::QueueChannel`]'s reader thread and the session
/// loop that consumes it.
pub struct MessageQueue {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    /// An empty, non-terminated queue.
    pub fn new() -> Self {
        MessageQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                terminated: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Push a value and wake one waiter. No-op once [`clear`](Self::clear)
    /// has terminated the queue.
    pub fn put(&self, item: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.terminated {
            return;
        }
        inner.items.push_back(item);
        self.condvar.notify_all();
    }

    /// Block until an item is available, the queue is terminated, or
    /// `timeout` elapses (`None` blocks forever). Returns `None` on timeout
    /// or termination, `Some(item)` otherwise — popped in put-order.
    ///
    /// Every wake re-checks both conditions before deciding whether to
    /// return or keep waiting, so spurious OS wakeups are harmless.
    pub fn get(&self, timeout: Option<Duration>) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.terminated {
                return None;
            }
            match deadline {
                None => {
                    inner = self.condvar.wait(inner).unwrap();
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (next, timed_out) =
                        self.condvar.wait_timeout(inner, deadline - now).unwrap();
                    inner = next;
                    if timed_out.timed_out() && inner.items.is_empty() && !inner.terminated {
                        return None;
                    }
                }
            }
        }
    }

    /// Block until an item is available or the queue is terminated, without
    /// consuming it; returns whether one is available. Matches the
    /// original's separate `wait()` entry point, used when a caller wants to
    /// block without committing to consuming a specific item yet.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if !inner.items.is_empty() {
                return true;
            }
            if inner.terminated {
                return false;
            }
            match deadline {
                None => inner = self.condvar.wait(inner).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    inner = self.condvar.wait_timeout(inner, deadline - now).unwrap().0;
                }
            }
        }
    }

    /// Set the sticky terminated flag and wake every waiter. Subsequent
    /// `get`/`wait` calls return immediately. If `terminating` is false,
    /// only drains pending items without setting the flag.
    pub fn clear(&self, terminating: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
        if terminating {
            inner.terminated = true;
        }
        self.condvar.notify_all();
    }

    /// Whether [`clear(true)`](Self::clear) has been called.
    pub fn is_terminated(&self) -> bool {
        self.inner.lock().unwrap().terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn returns_items_in_put_order() {
        let q = MessageQueue::new();
        q.put(b"a".to_vec());
        q.put(b"b".to_vec());
        q.put(b"c".to_vec());
        assert_eq!(q.get(Some(Duration::from_millis(1))), Some(b"a".to_vec()));
        assert_eq!(q.get(Some(Duration::from_millis(1))), Some(b"b".to_vec()));
        assert_eq!(q.get(Some(Duration::from_millis(1))), Some(b"c".to_vec()));
    }

    #[test]
    fn get_times_out_on_empty_queue() {
        let q = MessageQueue::new();
        assert_eq!(q.get(Some(Duration::from_millis(5))), None);
    }

    #[test]
    fn clear_terminating_wakes_waiters_with_none() {
        let q = Arc::new(MessageQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.get(None));
        thread::sleep(Duration::from_millis(10));
        q.clear(true);
        assert_eq!(handle.join().unwrap(), None);
        assert!(q.is_terminated());
    }

    #[test]
    fn put_after_terminate_is_dropped() {
        let q = MessageQueue::new();
        q.clear(true);
        q.put(b"x".to_vec());
        assert_eq!(q.get(Some(Duration::from_millis(1))), None);
    }
}

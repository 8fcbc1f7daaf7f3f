//! Flush Barrier Queue - a blocking single-consumer work queue.
//!
//! Producers [`push`](FlushBarrierQueue::push) items; one consumer thread
//! takes them with [`pop_blocking`](FlushBarrierQueue::pop_blocking). Each
//! popped item is handed out inside an [`InFlight`] guard and counts as
//! outstanding until the guard drops, so
//! [`wait_until_empty`](FlushBarrierQueue::wait_until_empty) returns only
//! after the consumer has *finished* everything pushed before the call.
//!
//! ## Barrier protocol
//!
//! ```text
//! producer: push(batch end) -> wait_until_empty() ........ returns
//! consumer:                    pop -> write -> drop guard --^
//! ```
//!
//! If the consumer panics while holding a guard the queue is abandoned:
//! pending items are dropped, later pushes are discarded and every barrier
//! wait returns at once.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

struct State<T> {
    items: VecDeque<T>,
    /// Popped but not yet completed
    in_flight: usize,
}

/// FIFO queue with a drain barrier and cooperative stop.
pub struct FlushBarrierQueue<T> {
    state: Mutex<State<T>>,
    /// Signalled on push and stop
    ready: Condvar,
    /// Signalled when the queue runs dry with nothing in flight
    drained: Condvar,
    stop: AtomicBool,
    /// Consumer died mid-item
    abandoned: AtomicBool,
}

impl<T> FlushBarrierQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                in_flight: 0,
            }),
            ready: Condvar::new(),
            drained: Condvar::new(),
            stop: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
        }
    }

    // The queue state is consistent between every statement, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item and wake the consumer.
    pub fn push(&self, item: T) {
        let mut state = self.lock();
        if self.is_abandoned() {
            return;
        }
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
    }

    /// Take the oldest item, blocking while the queue is empty.
    ///
    /// # Returns
    /// `None` once a stop was requested and nothing is left to take.
    pub fn pop_blocking(&self) -> Option<InFlight<'_, T>> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                state.in_flight += 1;
                return Some(InFlight {
                    queue: self,
                    item: Some(item),
                });
            }
            if self.stop.load(Ordering::Acquire) || self.is_abandoned() {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the oldest item if there is one, without blocking.
    pub fn try_pop(&self) -> Option<InFlight<'_, T>> {
        let mut state = self.lock();
        let item = state.items.pop_front()?;
        state.in_flight += 1;
        Some(InFlight {
            queue: self,
            item: Some(item),
        })
    }

    /// Block until every pushed item has been popped and completed, or
    /// the consumer has died.
    pub fn wait_until_empty(&self) {
        let mut state = self.lock();
        while !self.is_abandoned() && (!state.items.is_empty() || state.in_flight > 0) {
            state = self.drained.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Ask the consumer to exit once the queue is empty. Pending items are
    /// still delivered.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        // Taking the lock orders the store before any waiter's re-check
        drop(self.lock());
        self.ready.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Whether the consumer panicked while processing an item
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Items waiting to be popped (excludes in-flight ones)
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn complete(&self) {
        let mut state = self.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 && state.items.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Called from a guard dropped during unwinding.
    fn abandon(&self) {
        let mut state = self.lock();
        state.in_flight -= 1;
        let pending = std::mem::take(&mut state.items);
        self.abandoned.store(true, Ordering::Release);
        drop(state);

        warn!(dropped = pending.len(), "queue consumer panicked");
        self.ready.notify_all();
        self.drained.notify_all();
    }
}

impl<T> Default for FlushBarrierQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FlushBarrierQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FlushBarrierQueue")
            .field("queued", &state.items.len())
            .field("in_flight", &state.in_flight)
            .field("stopped", &self.is_stopped())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// A popped item. Completes when dropped.
pub struct InFlight<'a, T> {
    queue: &'a FlushBarrierQueue<T>,
    item: Option<T>,
}

impl<T> InFlight<'_, T> {
    /// Move the item out. It still counts as in flight until the guard drops.
    pub fn take(&mut self) -> Option<T> {
        self.item.take()
    }
}

impl<T> Deref for InFlight<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.item {
            Some(item) => item,
            None => panic!("in-flight item already taken"),
        }
    }
}

impl<T> DerefMut for InFlight<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => panic!("in-flight item already taken"),
        }
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.queue.abandon();
        } else {
            self.queue.complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = FlushBarrierQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        queue.request_stop();

        let mut seen = Vec::new();
        while let Some(item) = queue.pop_blocking() {
            seen.push(*item);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_stop_on_empty_returns_none() {
        let queue: FlushBarrierQueue<u32> = FlushBarrierQueue::new();
        queue.request_stop();
        assert!(queue.pop_blocking().is_none());
        assert!(queue.is_stopped());
    }

    #[test]
    fn test_wait_until_empty_on_idle_queue() {
        let queue: FlushBarrierQueue<u32> = FlushBarrierQueue::new();
        queue.wait_until_empty();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_keeps_item_in_flight() {
        let queue = FlushBarrierQueue::new();
        queue.push(String::from("x"));

        let mut guard = queue.try_pop().unwrap();
        assert_eq!(guard.take().as_deref(), Some("x"));
        assert!(format!("{queue:?}").contains("in_flight: 1"));
        drop(guard);

        queue.wait_until_empty();
    }

    #[test]
    fn test_blocked_consumer_wakes_on_push() {
        let queue = Arc::new(FlushBarrierQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_blocking().map(|item| *item))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(42u32);

        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_blocked_consumer_wakes_on_stop() {
        let queue: Arc<FlushBarrierQueue<u32>> = Arc::new(FlushBarrierQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_blocking().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        queue.request_stop();

        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_barrier_waits_for_completion_not_just_pop() {
        let queue = Arc::new(FlushBarrierQueue::new());
        let done = Arc::new(AtomicUsize::new(0));

        let consumer = {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while let Some(_item) = queue.pop_blocking() {
                    thread::sleep(Duration::from_millis(5));
                    done.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        for round in 1..=3 {
            for i in 0..10 {
                queue.push(i);
            }
            queue.wait_until_empty();
            assert_eq!(done.load(Ordering::SeqCst), round * 10);
        }

        queue.request_stop();
        consumer.join().unwrap();
    }

    #[test]
    fn test_stop_does_not_discard_pending() {
        let queue = Arc::new(FlushBarrierQueue::new());
        for i in 0..100 {
            queue.push(i);
        }
        queue.request_stop();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut count = 0;
                while let Some(_item) = queue.pop_blocking() {
                    count += 1;
                }
                count
            })
        };

        assert_eq!(consumer.join().unwrap(), 100);
    }

    #[test]
    fn test_panicking_consumer_releases_barrier() {
        let queue = Arc::new(FlushBarrierQueue::new());
        for i in 0..10 {
            queue.push(i);
        }

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let _item = queue.pop_blocking();
                panic!("consumer failed");
            })
        };
        assert!(consumer.join().is_err());

        // Neither waits nor pushes may block on the dead consumer
        queue.wait_until_empty();
        queue.push(11);
        assert!(queue.is_abandoned());
        assert!(queue.is_empty());
        assert!(queue.pop_blocking().is_none());
    }
}

//! Fixed-capacity blocking FIFO with a cooperative quit flag.
//!
//! Producers block while the queue is full, consumers block while it is empty.
//! Calling [`BoundedQueue::quit`] wakes every waiter: producers drop their item,
//! consumers drain whatever is left and then receive `None`.

use std::{
    collections::VecDeque,
    fmt,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Reason a non-blocking enqueue handed the item back.
#[derive(Error)]
pub enum TryEnqueueError<T> {
    #[error("queue is full")]
    Full(T),
    #[error("queue is quitting")]
    Quitting(T),
}

impl<T> TryEnqueueError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            TryEnqueueError::Full(item) | TryEnqueueError::Quitting(item) => item,
        }
    }
}

impl<T> fmt::Debug for TryEnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryEnqueueError::Full(_) => f.write_str("Full(..)"),
            TryEnqueueError::Quitting(_) => f.write_str("Quitting(..)"),
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    quitting: bool,
}

/// Blocking bounded queue shared between one or more producers and consumers.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded queue capacity must be at least 1");
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                quitting: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Append `item`, blocking while the queue is full.
    ///
    /// Returns `false` when the queue is quitting; the item is dropped.
    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.quitting {
            self.not_full.wait(&mut state);
        }
        if state.quitting {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Append `item` only if there is room right now.
    pub fn try_enqueue(&self, item: T) -> Result<(), TryEnqueueError<T>> {
        let mut state = self.state.lock();
        if state.quitting {
            return Err(TryEnqueueError::Quitting(item));
        }
        if state.items.len() >= self.capacity {
            return Err(TryEnqueueError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is quitting and fully drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.quitting {
            self.not_empty.wait(&mut state);
        }
        self.pop_locked(&mut state)
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.quitting {
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        self.pop_locked(&mut state)
    }

    fn pop_locked(&self, state: &mut State<T>) -> Option<T> {
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Signal shutdown and wake every blocked producer and consumer.
    pub fn quit(&self) {
        let mut state = self.state.lock();
        if state.quitting {
            return;
        }
        state.quitting = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_quitting(&self) -> bool {
        self.state.lock().quitting
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("quitting", &state.quitting)
            .finish()
    }
}

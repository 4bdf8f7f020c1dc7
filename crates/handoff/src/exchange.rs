//! Latest-value hand-off between a single writer and any number of readers.

use std::fmt;

use parking_lot::Mutex;

/// Double-buffered slot: the writer swaps a freshly built value in and gets the
/// previous one back, readers copy or take the most recently published value.
///
/// Every access happens under one lock, so a reader never sees a value that is
/// half way through being replaced. Intermediate values may be skipped by a
/// reader that polls slower than the writer publishes.
pub struct Exchange<T> {
    slot: Mutex<T>,
}

impl<T> Exchange<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Mutex::new(initial),
        }
    }

    /// Publish `value` and return the value it replaced.
    pub fn swap(&self, value: T) -> T {
        std::mem::replace(&mut *self.slot.lock(), value)
    }

    /// Run `f` against the current value while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.slot.lock())
    }
}

impl<T: Clone> Exchange<T> {
    /// Copy of the most recently published value.
    pub fn latest(&self) -> T {
        self.slot.lock().clone()
    }
}

impl<T: Default> Exchange<T> {
    /// Take ownership of the current value, leaving the default behind.
    pub fn take(&self) -> T {
        std::mem::take(&mut *self.slot.lock())
    }
}

impl<T: Default> Default for Exchange<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Exchange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("slot", &*self.slot.lock())
            .finish()
    }
}

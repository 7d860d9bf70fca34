//! The process-wide write lock serializing root transactions.
//!
//! Unlike a `MutexGuard`, holding this lock is not tied to a value's
//! lifetime: the transaction frame that empties a thread's stack releases
//! it, whichever frame that is.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct WriteLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl WriteLock {
    /// Block until the lock is free, then take it.
    pub(crate) fn acquire(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
    }

    pub(crate) fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_one();
    }
}

//! Completion barrier for in-flight work
//!
//! [`WaitGroup`] counts outstanding units of work: producers `add` before
//! handing work off, finishers call `done` exactly once per unit, and any
//! number of tasks can `wait` for the count to return to zero. The engine
//! uses one to know when every accepted job has produced its result.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::error;

/// Errors surfaced by [`WaitGroup`] accounting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitGroupError {
    /// `done` was called more times than `add` registered.
    #[error("wait group count would drop below zero")]
    Underflow,
}

/// A barrier that releases waiters when all registered work has finished.
///
/// The count can never go negative: a `done` without a matching `add` is
/// rejected with [`WaitGroupError::Underflow`] instead of corrupting the
/// count, and is logged loudly since it always indicates an accounting bug
/// in the caller.
///
/// `wait` callers racing a concurrent `add` from an unrelated task may or
/// may not observe the new unit; callers that need the barrier to cover a
/// unit must `add` it before sharing the group with waiters, same as any
/// fork-join structure.
#[derive(Debug, Default)]
pub struct WaitGroup {
    count: Mutex<u64>,
    zero: Notify,
}

impl WaitGroup {
    /// Creates a group with no outstanding work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `n` additional units of outstanding work.
    pub fn add(&self, n: u64) {
        *self.count.lock() += n;
    }

    /// Marks one unit of work as finished.
    ///
    /// The last `done` that brings the count to zero wakes every task
    /// blocked in [`wait`](Self::wait).
    pub fn done(&self) -> Result<(), WaitGroupError> {
        let mut count = self.count.lock();
        if *count == 0 {
            drop(count);
            error!("wait group done() without matching add(); count stays at zero");
            return Err(WaitGroupError::Underflow);
        }
        *count -= 1;
        let reached_zero = *count == 0;
        drop(count);
        if reached_zero {
            self.zero.notify_waiters();
        }
        Ok(())
    }

    /// Returns the number of units still outstanding.
    pub fn outstanding(&self) -> u64 {
        *self.count.lock()
    }

    /// Waits until the count reaches zero.
    ///
    /// Returns immediately if nothing is outstanding. Cancel-safe: dropping
    /// the future consumes nothing and leaves the group untouched.
    pub async fn wait(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking the count, so a final
            // done() between the check and the await cannot be missed.
            notified.as_mut().enable();
            if *self.count.lock() == 0 {
                return;
            }
            notified.await;
        }
    }
}

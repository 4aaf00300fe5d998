//! Lock-free counters and flags
//!
//! Counters are read and written concurrently by every worker plus the
//! engine itself, so all operations use sequentially consistent ordering:
//! once an update lands, no observer can read an older value, and reads
//! are never torn regardless of platform word width.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// A signed counter safe to update from any number of tasks or threads.
///
/// Increments and decrements are atomic read-modify-write operations; the
/// interleaving of concurrent updates never loses one.
#[derive(Debug)]
pub struct AtomicCounter {
    value: AtomicI64,
}

impl AtomicCounter {
    /// Creates a counter holding `initial`.
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Adds `delta` and returns the updated value.
    pub fn increment(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// Subtracts `delta` and returns the updated value.
    pub fn decrement(&self, delta: i64) -> i64 {
        self.value.fetch_sub(delta, Ordering::SeqCst) - delta
    }

    /// Returns the current value.
    pub fn load(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Overwrites the current value.
    pub fn store(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically replaces `expected` with `new`.
    ///
    /// Returns `true` if the counter held `expected` and was updated, and
    /// `false` if another writer got there first.
    pub fn compare_and_swap(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A one-bit latch for "has this happened yet" checks across tasks.
#[derive(Debug, Default)]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns `true` only for the call that actually
    /// flipped it, so racing setters can tell who won.
    pub fn set(&self) -> bool {
        !self.value.swap(true, Ordering::SeqCst)
    }

    /// Lowers the flag.
    pub fn clear(&self) {
        self.value.store(false, Ordering::SeqCst);
    }

    /// Returns whether the flag is currently raised.
    pub fn is_set(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_increment_and_decrement() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.increment(1), 1);
        assert_eq!(counter.increment(4), 5);
        assert_eq!(counter.decrement(2), 3);
        assert_eq!(counter.load(), 3);
    }

    #[test]
    fn test_decrement_below_zero_is_allowed() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.decrement(1), -1);
        assert_eq!(counter.load(), -1);
    }

    #[test]
    fn test_store_overwrites() {
        let counter = AtomicCounter::new(10);
        counter.store(-3);
        assert_eq!(counter.load(), -3);
    }

    #[test]
    fn test_concurrent_increments_lose_nothing() {
        const THREADS: usize = 8;
        const INCREMENTS: usize = 10_000;

        let counter = Arc::new(AtomicCounter::new(0));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..INCREMENTS {
                        counter.increment(1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(), (THREADS * INCREMENTS) as i64);
    }

    #[test]
    fn test_compare_and_swap() {
        let counter = AtomicCounter::new(7);
        assert!(counter.compare_and_swap(7, 9));
        assert_eq!(counter.load(), 9);
        // stale expectation loses
        assert!(!counter.compare_and_swap(7, 11));
        assert_eq!(counter.load(), 9);
    }

    #[test]
    fn test_flag_reports_single_winner() {
        const THREADS: usize = 8;

        let flag = Arc::new(AtomicFlag::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let flag = flag.clone();
                thread::spawn(move || flag.set())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(flag.is_set());
    }

    #[test]
    fn test_flag_clear() {
        let flag = AtomicFlag::new();
        assert!(flag.set());
        flag.clear();
        assert!(!flag.is_set());
        assert!(flag.set());
    }
}

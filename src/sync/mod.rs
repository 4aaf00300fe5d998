//! Synchronization primitives shared by the engine and its workers
//!
//! Provides:
//! - [`AtomicCounter`] / [`AtomicFlag`]: lock-free counters and latches for
//!   cross-task accounting
//! - [`WaitGroup`]: a completion barrier that tracks outstanding work and
//!   releases waiters when the count returns to zero

mod counter;
mod wait_group;

pub use counter::{AtomicCounter, AtomicFlag};
pub use wait_group::{WaitGroup, WaitGroupError};

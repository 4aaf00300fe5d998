//! The worker pool and its per-worker execution loop
//!
//! A [`WorkerPool`] spawns one task per worker. Each worker claims jobs
//! from the shared job queue, passes the rate-limit gate if one is
//! configured, runs the work function with panic containment and deadline
//! enforcement, and pushes exactly one result per claimed job. The pool
//! resizes live in both directions: grown workers join the queue
//! immediately, shrunk workers finish their current job before retiring.

mod pool;
mod runner;

pub use pool::WorkerPool;
pub use runner::{WorkerId, WorkerPhase};

pub(crate) use pool::PoolContext;

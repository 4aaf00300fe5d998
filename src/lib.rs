//! # Taskmill
//!
//! A bounded worker-pool task execution engine with rate limiting, cancellation
//! scopes, and graceful shutdown.
//!
//! ## Features
//!
//! - **Bounded queues with backpressure**: submitting blocks while the job queue
//!   is full instead of growing without limit or dropping work
//! - **Dynamic worker pool**: scale up or down at runtime; shrinking retires
//!   workers only between jobs, never mid-flight
//! - **Token-bucket rate limiting**: strict cadence or bounded burst, with idle
//!   refill ticks discarded rather than banked
//! - **Hierarchical cancellation**: deadline and explicit-cancel scopes that
//!   propagate parent-to-child, raced against every blocking wait
//! - **Contained failures**: a panicking or failing job becomes an error result;
//!   the worker recovers and keeps serving
//! - **Graceful shutdown**: in-flight work drains within a grace period, queued
//!   work is reported as cancelled, and nothing is silently lost
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Engine                             │
//! │   (submit / collect / scale_pool / shutdown, owns counters)  │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      JobQueue (bounded)                      │
//! │    (backpressure: submit waits while the queue is full)      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         WorkerPool                           │
//! │   (claims jobs, gates on RateLimiter, runs the JobHandler    │
//! │    under a CancelScope, contains panics, emits JobResults)   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ResultQueue → ResultStream                 │
//! │         (one result per accepted job, completion order)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use taskmill::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig::new()
//!         .with_worker_count(4)
//!         .with_queue_capacity(64)
//!         .with_rate(RateLimiterConfig::new(Duration::from_millis(100), 5))
//!         .with_default_timeout(Duration::from_secs(30));
//!
//!     let handler = FnHandler::new(|ctx: JobContext<u64>| async move {
//!         Ok(ctx.payload() * 2)
//!     });
//!
//!     let engine = Engine::new(config, handler)?;
//!     engine.start()?;
//!
//!     // Drain results concurrently so workers never stall on a full
//!     // result queue.
//!     let mut results = engine.collect()?;
//!     let collector = tokio::spawn(async move {
//!         let mut outcomes = Vec::new();
//!         while let Some(result) = results.next().await {
//!             outcomes.push(result);
//!         }
//!         outcomes
//!     });
//!
//!     for n in 0..100u64 {
//!         engine.submit(n).await?;
//!     }
//!
//!     let clean = engine.shutdown(Duration::from_secs(5)).await?;
//!     assert!(clean);
//!
//!     for result in collector.await.unwrap() {
//!         println!("{}: {:?}", result.job_id, result.outcome);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod engine;
pub mod job;
pub mod queue;
pub mod rate;
pub mod sync;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::cancel::{CancelGuard, CancelReason, CancelScope};
    pub use crate::engine::{
        CounterSnapshot, Engine, EngineConfig, EngineError, EngineStatus, ResultStream,
    };
    pub use crate::job::{
        FnHandler, HandlerResult, JobContext, JobError, JobHandler, JobId, JobResult,
    };
    pub use crate::rate::{RateLimiter, RateLimiterConfig, RateToken};
    pub use crate::sync::{AtomicCounter, AtomicFlag, WaitGroup};
    pub use crate::worker::{WorkerId, WorkerPhase, WorkerPool};
}

// Re-export key types at crate root
pub use cancel::{CancelGuard, CancelReason, CancelScope};
pub use engine::{CounterSnapshot, Engine, EngineConfig, EngineError, EngineStatus, ResultStream};
pub use job::{FnHandler, HandlerResult, JobContext, JobError, JobHandler, JobId, JobResult};
pub use queue::{QueueError, QueueReceiver, QueueSender};
pub use rate::{RateError, RateLimiter, RateLimiterConfig, RateToken};
pub use sync::{AtomicCounter, AtomicFlag, WaitGroup, WaitGroupError};
pub use worker::{WorkerId, WorkerPhase, WorkerPool};

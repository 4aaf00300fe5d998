//! Jobs, results, and the work function seam
//!
//! A [`Job`] wraps a caller payload with its identity and deadline; a
//! [`JobResult`] carries the outcome back, successful or not. The engine
//! invokes user code through the [`JobHandler`] trait, usually via
//! [`FnHandler`] which adapts an async closure, and hands it a
//! [`JobContext`] with the payload and the cancellation scope covering the
//! run.

mod context;
mod handler;
mod types;

pub use context::JobContext;
pub use handler::{FnHandler, HandlerResult, JobHandler, SharedHandler};
pub use types::{Job, JobError, JobId, JobResult};

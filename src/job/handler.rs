use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::JobContext;

/// What a work function produces: a value, or an error message that
/// becomes a `JobError::Failed` outcome.
pub type HandlerResult<R> = Result<R, String>;

/// The work the engine runs for every job.
///
/// One handler instance serves every worker concurrently, so
/// implementations hold shared state behind `Arc`/atomics rather than
/// `&mut self`.
#[async_trait]
pub trait JobHandler<T, R>: Send + Sync + 'static {
    /// Executes one job to completion or until its scope fires.
    async fn run(&self, ctx: JobContext<T>) -> HandlerResult<R>;
}

/// Handler as stored and shared by the engine.
pub type SharedHandler<T, R> = Arc<dyn JobHandler<T, R>>;

/// Adapts an async closure into a [`JobHandler`].
///
/// ```ignore
/// let handler = FnHandler::new(|ctx: JobContext<u64>| async move {
///     Ok(ctx.payload() * 2)
/// });
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Wraps `f` so it can serve as the engine's work function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, R, F, Fut> JobHandler<T, R> for FnHandler<F>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(JobContext<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    async fn run(&self, ctx: JobContext<T>) -> HandlerResult<R> {
        (self.f)(ctx).await
    }
}

use std::fmt;

use crate::cancel::{CancelReason, CancelScope};
use crate::worker::WorkerId;

use super::JobId;

/// Execution-side view of a job, handed to the work function.
///
/// Carries the payload together with the cancellation scope covering this
/// run. Long-running work should race itself against
/// [`cancelled`](Self::cancelled) so engine shutdown and per-job deadlines
/// take effect promptly:
///
/// ```ignore
/// async fn crawl(ctx: JobContext<Url>) -> HandlerResult<Page> {
///     tokio::select! {
///         page = fetch(ctx.payload()) => Ok(page?),
///         _ = ctx.cancelled() => Err("crawl abandoned".into()),
///     }
/// }
/// ```
pub struct JobContext<T> {
    job_id: JobId,
    payload: T,
    scope: CancelScope,
    worker: WorkerId,
}

impl<T> JobContext<T> {
    pub(crate) fn new(job_id: JobId, payload: T, scope: CancelScope, worker: WorkerId) -> Self {
        Self {
            job_id,
            payload,
            scope,
            worker,
        }
    }

    /// The job being executed.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Borrows the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the context and takes the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// The worker executing this job.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// The cancellation scope covering this run; clone it to hand the
    /// signal to helper tasks.
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Completes when the run is cancelled, whether by engine shutdown or
    /// this job's deadline. Cancel-safe, made for `tokio::select!`.
    pub async fn cancelled(&self) {
        self.scope.cancelled().await;
    }

    /// Returns whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Why the run was cancelled, once it has been.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.scope.reason()
    }
}

impl<T> fmt::Debug for JobContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("worker", &self.worker)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_observes_scope() {
        let (scope, guard) = CancelScope::new();
        let ctx = JobContext::new(JobId::new(1), "payload", scope, 3);

        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), None);

        guard.cancel();

        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::Explicit));
        ctx.cancelled().await;
        assert_eq!(ctx.payload(), &"payload");
        assert_eq!(ctx.worker(), 3);
    }

    #[tokio::test]
    async fn test_into_payload() {
        let (scope, _guard) = CancelScope::new();
        let ctx = JobContext::new(JobId::new(2), vec![1u8, 2, 3], scope, 0);
        assert_eq!(ctx.job_id(), JobId::new(2));
        assert_eq!(ctx.into_payload(), vec![1, 2, 3]);
    }
}

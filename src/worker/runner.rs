use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::cancel::{CancelReason, CancelScope};
use crate::engine::EngineCounters;
use crate::job::{Job, JobContext, JobError, JobResult, SharedHandler};
use crate::queue::{QueueReceiver, QueueSender};
use crate::rate::{RateError, RateLimiter};
use crate::sync::WaitGroup;

/// Identifier of one worker within a pool.
pub type WorkerId = u32;

/// Where a worker currently is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    /// Waiting for a job.
    Idle = 0,
    /// Executing a job.
    Running = 1,
    /// Told to retire; will stop after the current job.
    Stopping = 2,
    /// Loop exited.
    Stopped = 3,
}

impl WorkerPhase {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerPhase::Idle,
            1 => WorkerPhase::Running,
            3 => WorkerPhase::Stopped,
            _ => WorkerPhase::Stopping,
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::Running => "running",
            WorkerPhase::Stopping => "stopping",
            WorkerPhase::Stopped => "stopped",
        };
        write!(f, "{text}")
    }
}

/// Everything one worker task needs, cloned out of the pool at spawn time.
pub(crate) struct WorkerContext<T, R> {
    pub(crate) id: WorkerId,
    pub(crate) jobs: QueueReceiver<Job<T>>,
    pub(crate) results: QueueSender<JobResult<R>>,
    pub(crate) handler: SharedHandler<T, R>,
    pub(crate) limiter: Option<Arc<RateLimiter>>,
    /// Pool-wide claim gate; fired once at shutdown.
    pub(crate) quiesce: CancelScope,
    /// This worker's retirement signal, a child of the quiesce scope.
    pub(crate) stop: CancelScope,
    /// Parent of every per-job scope; fired only on forced cutoff.
    pub(crate) abort: CancelScope,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) wait_group: Arc<WaitGroup>,
    pub(crate) counters: Arc<EngineCounters>,
    pub(crate) phase: Arc<AtomicU8>,
}

impl<T, R> WorkerContext<T, R> {
    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Records the outcome, delivers it, and checks this job out of the
    /// completion barrier, in that order, so a zero barrier means every
    /// result has been pushed.
    async fn finish(&self, result: JobResult<R>) {
        match &result.outcome {
            Ok(_) => {
                self.counters.completed.increment(1);
            }
            Err(JobError::Failed(_)) => {
                self.counters.failed.increment(1);
            }
            Err(JobError::Panicked(_)) => {
                self.counters.panicked.increment(1);
            }
            Err(JobError::Cancelled(_)) => {
                self.counters.cancelled.increment(1);
            }
            Err(JobError::TimedOut) => {
                self.counters.timed_out.increment(1);
            }
        }
        if self.results.push(result).await.is_err() {
            // Forced cutoff closed the result stream before this outcome
            // could be delivered.
            warn!(worker = self.id, "Result dropped: result queue closed");
        }
        if let Err(error) = self.wait_group.done() {
            error!(worker = self.id, %error, "Job accounting violated");
        }
    }
}

/// The per-worker loop: claim, gate, execute, report, repeat.
///
/// Exits when the retirement signal fires or the job queue ends. Claimed
/// jobs are never abandoned silently: every exit path emits a result.
#[instrument(skip(ctx), fields(worker = ctx.id))]
pub(crate) async fn run<T, R>(ctx: WorkerContext<T, R>)
where
    T: Send + 'static,
    R: Send + 'static,
{
    debug!("Worker started");
    loop {
        ctx.set_phase(WorkerPhase::Idle);
        let job = tokio::select! {
            biased;
            _ = ctx.stop.cancelled() => break,
            job = ctx.jobs.pop() => match job {
                Some(job) => job,
                // queue closed and drained
                None => break,
            },
        };
        process(&ctx, job).await;
    }
    ctx.set_phase(WorkerPhase::Stopped);
    debug!("Worker stopped");
}

async fn process<T, R>(ctx: &WorkerContext<T, R>, job: Job<T>)
where
    T: Send + 'static,
    R: Send + 'static,
{
    let job_id = job.id;

    // Rate gate: one token per job start. The wait races the pool-wide
    // quiesce signal, not this worker's own stop signal, so an individual
    // retirement waits for the current job, shutdown does not.
    if let Some(limiter) = &ctx.limiter {
        if let Err(error) = limiter.acquire(&ctx.quiesce).await {
            let reason = match error {
                RateError::Cancelled(reason) => reason,
                // acquire only fails on cancellation
                _ => CancelReason::Explicit,
            };
            debug!(job = %job_id, %reason, "Claim abandoned while awaiting rate token");
            ctx.finish(JobResult::failure(
                job_id,
                JobError::Cancelled(reason),
                Some(ctx.id),
            ))
            .await;
            return;
        }
    }

    ctx.set_phase(WorkerPhase::Running);
    let started = Instant::now();
    let result = execute(ctx, job).await;
    let elapsed = started.elapsed();
    match &result.outcome {
        Ok(_) => debug!(job = %job_id, ?elapsed, "Job completed"),
        Err(error) => debug!(job = %job_id, ?elapsed, %error, "Job finished without a value"),
    }
    ctx.finish(result).await;
}

/// Runs the work function under a per-job scope, containing panics and
/// racing the run against cancellation and its deadline.
async fn execute<T, R>(ctx: &WorkerContext<T, R>, job: Job<T>) -> JobResult<R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    let job_id = job.id;
    let timeout = job.timeout.or(ctx.default_timeout);
    let (scope, _guard) = match timeout {
        Some(timeout) => ctx.abort.child_with_timeout(timeout),
        None => ctx.abort.child(),
    };
    let context = JobContext::new(job_id, job.payload, scope.clone(), ctx.id);
    let work = AssertUnwindSafe(ctx.handler.run(context)).catch_unwind();

    tokio::select! {
        outcome = work => match outcome {
            Ok(Ok(value)) => JobResult::success(job_id, value, ctx.id),
            Ok(Err(message)) => {
                JobResult::failure(job_id, JobError::Failed(message), Some(ctx.id))
            }
            Err(panic) => {
                warn!(job = %job_id, "Job panicked; worker continues");
                JobResult::failure(
                    job_id,
                    JobError::Panicked(panic_message(panic)),
                    Some(ctx.id),
                )
            }
        },
        _ = scope.cancelled() => {
            let error = match scope.reason() {
                Some(CancelReason::Timeout) => JobError::TimedOut,
                reason => JobError::Cancelled(reason.unwrap_or(CancelReason::Explicit)),
            };
            JobResult::failure(job_id, error, Some(ctx.id))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelGuard;
    use crate::job::{FnHandler, JobHandler, JobId};
    use crate::queue;
    use crate::rate::RateLimiterConfig;
    use tokio::task::JoinHandle;

    struct Fixture {
        jobs_tx: queue::QueueSender<Job<u64>>,
        results_rx: queue::QueueReceiver<JobResult<u64>>,
        quiesce_guard: CancelGuard,
        stop_guard: CancelGuard,
        abort_guard: CancelGuard,
        wait_group: Arc<WaitGroup>,
        counters: Arc<EngineCounters>,
        phase: Arc<AtomicU8>,
        worker: JoinHandle<()>,
    }

    impl Fixture {
        fn spawn<H>(
            handler: H,
            limiter: Option<Arc<RateLimiter>>,
            default_timeout: Option<Duration>,
        ) -> Self
        where
            H: JobHandler<u64, u64>,
        {
            let (jobs_tx, jobs_rx) = queue::bounded(8);
            let (results_tx, results_rx) = queue::bounded(8);
            let (quiesce, quiesce_guard) = CancelScope::new();
            let (stop, stop_guard) = quiesce.child();
            let (abort, abort_guard) = CancelScope::new();
            let wait_group = Arc::new(WaitGroup::new());
            let counters = Arc::new(EngineCounters::new());
            let phase = Arc::new(AtomicU8::new(WorkerPhase::Idle as u8));

            let context = WorkerContext {
                id: 1,
                jobs: jobs_rx,
                results: results_tx,
                handler: Arc::new(handler),
                limiter,
                quiesce,
                stop,
                abort,
                default_timeout,
                wait_group: wait_group.clone(),
                counters: counters.clone(),
                phase: phase.clone(),
            };
            let worker = tokio::spawn(run(context));

            Self {
                jobs_tx,
                results_rx,
                quiesce_guard,
                stop_guard,
                abort_guard,
                wait_group,
                counters,
                phase,
                worker,
            }
        }

        async fn submit(&self, id: u64, payload: u64) {
            self.wait_group.add(1);
            self.jobs_tx
                .push(Job::new(JobId::new(id), payload))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_worker_processes_jobs_in_order() {
        let fixture = Fixture::spawn(
            FnHandler::new(|ctx: JobContext<u64>| async move { Ok(ctx.payload() * 2) }),
            None,
            None,
        );

        for id in 1..=3 {
            fixture.submit(id, id * 10).await;
        }

        for id in 1..=3 {
            let result = fixture.results_rx.pop().await.unwrap();
            assert_eq!(result.job_id, JobId::new(id));
            assert_eq!(result.value(), Some(&(id * 20)));
            assert_eq!(result.worker, Some(1));
        }

        fixture.wait_group.wait().await;
        assert_eq!(fixture.counters.completed.load(), 3);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let fixture = Fixture::spawn(
            FnHandler::new(|ctx: JobContext<u64>| async move {
                if *ctx.payload() == 13 {
                    panic!("boom");
                }
                Ok(*ctx.payload())
            }),
            None,
            None,
        );

        fixture.submit(1, 13).await;
        fixture.submit(2, 7).await;

        let first = fixture.results_rx.pop().await.unwrap();
        match first.error() {
            Some(JobError::Panicked(message)) => assert!(message.contains("boom")),
            other => panic!("expected a panic outcome, got {other:?}"),
        }

        // the same worker is still alive and serves the next job
        let second = fixture.results_rx.pop().await.unwrap();
        assert_eq!(second.value(), Some(&7));

        assert_eq!(fixture.counters.panicked.load(), 1);
        assert_eq!(fixture.counters.completed.load(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_deadline_times_jobs_out() {
        let fixture = Fixture::spawn(
            FnHandler::new(|_ctx: JobContext<u64>| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(0)
            }),
            None,
            Some(Duration::from_millis(50)),
        );

        fixture.submit(1, 0).await;

        let result = fixture.results_rx.pop().await.unwrap();
        assert_eq!(result.error(), Some(&JobError::TimedOut));
        assert_eq!(fixture.counters.timed_out.load(), 1);
        fixture.wait_group.wait().await;
    }

    #[tokio::test]
    async fn test_stop_ends_the_loop() {
        let fixture = Fixture::spawn(
            FnHandler::new(|ctx: JobContext<u64>| async move { Ok(*ctx.payload()) }),
            None,
            None,
        );

        fixture.stop_guard.cancel();
        fixture.worker.await.unwrap();
        assert_eq!(
            WorkerPhase::from_u8(fixture.phase.load(Ordering::SeqCst)),
            WorkerPhase::Stopped
        );
    }

    #[tokio::test]
    async fn test_queue_close_ends_the_loop() {
        let fixture = Fixture::spawn(
            FnHandler::new(|ctx: JobContext<u64>| async move { Ok(*ctx.payload()) }),
            None,
            None,
        );

        fixture.jobs_tx.close().unwrap();
        fixture.worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiesce_releases_rate_limited_claim() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::new(
            Duration::from_secs(3600),
            0,
        )));
        let fixture = Fixture::spawn(
            FnHandler::new(|ctx: JobContext<u64>| async move { Ok(*ctx.payload()) }),
            Some(limiter),
            None,
        );

        fixture.submit(1, 5).await;
        // let the worker claim the job and park in the token wait
        tokio::time::sleep(Duration::from_millis(1)).await;

        fixture.quiesce_guard.cancel();

        let result = fixture.results_rx.pop().await.unwrap();
        assert!(result.is_cancelled());
        assert_eq!(fixture.wait_group.outstanding(), 0);
        fixture.worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_the_running_job() {
        let fixture = Fixture::spawn(
            FnHandler::new(|_ctx: JobContext<u64>| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(0)
            }),
            None,
            None,
        );

        fixture.submit(1, 0).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        fixture.abort_guard.cancel();

        let result = fixture.results_rx.pop().await.unwrap();
        assert_eq!(
            result.error(),
            Some(&JobError::Cancelled(CancelReason::Parent))
        );
        assert_eq!(fixture.counters.cancelled.load(), 1);
    }
}

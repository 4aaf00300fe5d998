//! Engine lifecycle and submission

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::{CancelGuard, CancelReason, CancelScope};
use crate::job::{Job, JobError, JobHandler, JobId, JobResult, SharedHandler};
use crate::queue::{self, QueueError, QueueReceiver, QueueSender};
use crate::rate::RateLimiter;
use crate::sync::{AtomicCounter, AtomicFlag, WaitGroup};
use crate::worker::{PoolContext, WorkerId, WorkerPhase, WorkerPool};

use super::collector::ResultStream;
use super::config::{ConfigError, EngineConfig};
use super::counters::{CounterSnapshot, EngineCounters};

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Constructed, not yet started
    Idle,
    /// Accepting and executing jobs
    Running,
    /// Shutdown in progress, no new submissions
    Draining,
    /// Shut down, all workers gone
    Stopped,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Idle => write!(f, "idle"),
            EngineStatus::Running => write!(f, "running"),
            EngineStatus::Draining => write!(f, "draining"),
            EngineStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected at construction
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `start()` called on an engine that already ran
    #[error("engine is already running")]
    AlreadyRunning,

    /// Operation requires a running engine
    #[error("engine is not running")]
    NotRunning,

    /// Submission arrived after shutdown closed the intake
    #[error("job queue is closed")]
    QueueClosed,

    /// A usage-contract breach that would corrupt accounting
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl From<QueueError> for EngineError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::Closed => EngineError::QueueClosed,
            QueueError::AlreadyClosed => {
                EngineError::ContractViolation("queue closed twice".to_string())
            }
        }
    }
}

/// A bounded pool of workers executing submitted jobs through one handler.
///
/// The engine owns the job queue, the result queue, the worker pool, and
/// the cancellation scopes tying them together. Payloads go in through
/// [`submit`](Self::submit), results come out through the single
/// [`ResultStream`] returned by [`collect`](Self::collect), and every
/// accepted job produces exactly one result unless shutdown cuts it off
/// after the grace period.
///
/// Engines are single-use: [`start`](Self::start) once,
/// [`shutdown`](Self::shutdown) once. All methods take `&self`, so an
/// `Arc<Engine>` can be shared across submitting tasks freely.
pub struct Engine<T, R> {
    config: EngineConfig,
    job_tx: QueueSender<Job<T>>,
    job_rx: QueueReceiver<Job<T>>,
    result_tx: QueueSender<JobResult<R>>,
    result_rx: Mutex<Option<QueueReceiver<JobResult<R>>>>,
    pool: WorkerPool<T, R>,
    quiesce_guard: CancelGuard,
    abort_guard: CancelGuard,
    wait_group: Arc<WaitGroup>,
    counters: Arc<EngineCounters>,
    next_job_id: AtomicCounter,
    accepting: AtomicFlag,
    status: Mutex<EngineStatus>,
}

impl<T, R> Engine<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Creates an engine running `handler` for every submitted payload.
    ///
    /// Validates the configuration and wires up the queues and scopes;
    /// workers are not spawned until [`start`](Self::start). When rate
    /// limiting is configured this must be called within a Tokio runtime
    /// because the limiter starts its refill task immediately.
    pub fn new<H>(config: EngineConfig, handler: H) -> Result<Self, EngineError>
    where
        H: JobHandler<T, R>,
    {
        config.validate()?;

        let (job_tx, job_rx) = queue::bounded(config.queue_capacity);
        let (result_tx, result_rx) = queue::bounded(config.queue_capacity);
        let (quiesce, quiesce_guard) = CancelScope::new();
        let (abort, abort_guard) = CancelScope::new();
        let wait_group = Arc::new(WaitGroup::new());
        let counters = Arc::new(EngineCounters::new());
        let handler: SharedHandler<T, R> = Arc::new(handler);
        let limiter = config
            .rate
            .clone()
            .map(|rate| Arc::new(RateLimiter::new(rate)));

        let pool = WorkerPool::new(PoolContext {
            jobs: job_rx.clone(),
            results: result_tx.clone(),
            handler,
            limiter,
            quiesce,
            abort,
            default_timeout: config.default_timeout,
            wait_group: wait_group.clone(),
            counters: counters.clone(),
        });

        Ok(Self {
            config,
            job_tx,
            job_rx,
            result_tx,
            result_rx: Mutex::new(Some(result_rx)),
            pool,
            quiesce_guard,
            abort_guard,
            wait_group,
            counters,
            next_job_id: AtomicCounter::new(0),
            accepting: AtomicFlag::new(),
            status: Mutex::new(EngineStatus::Idle),
        })
    }

    /// Starts the configured number of workers and opens the intake.
    ///
    /// Must be called within a Tokio runtime. Engines are single-use;
    /// starting anything but an idle engine fails with
    /// [`EngineError::AlreadyRunning`].
    #[instrument(skip(self), fields(engine = %self.config.engine_id))]
    pub fn start(&self) -> Result<(), EngineError> {
        {
            let mut status = self.status.lock();
            if *status != EngineStatus::Idle {
                return Err(EngineError::AlreadyRunning);
            }
            *status = EngineStatus::Running;
        }

        info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            rate_limited = self.config.rate.is_some(),
            "Starting engine"
        );

        self.pool.scale_to(self.config.worker_count);
        self.accepting.set();
        Ok(())
    }

    /// Submits a payload and returns the assigned job id.
    ///
    /// Waits when the job queue is full; the returned future completes
    /// once the job is queued (or handed off directly under rendezvous
    /// capacity). Fails with [`EngineError::NotRunning`] before
    /// [`start`](Self::start) and [`EngineError::QueueClosed`] once
    /// shutdown has begun.
    #[instrument(skip(self, payload), fields(engine = %self.config.engine_id))]
    pub async fn submit(&self, payload: T) -> Result<JobId, EngineError> {
        self.submit_job(payload, None).await
    }

    /// Submits a payload with a per-job deadline overriding the
    /// configured default.
    #[instrument(skip(self, payload), fields(engine = %self.config.engine_id))]
    pub async fn submit_with_timeout(
        &self,
        payload: T,
        timeout: Duration,
    ) -> Result<JobId, EngineError> {
        self.submit_job(payload, Some(timeout)).await
    }

    async fn submit_job(&self, payload: T, timeout: Option<Duration>) -> Result<JobId, EngineError> {
        if !self.accepting.is_set() {
            return Err(match self.status() {
                EngineStatus::Idle => EngineError::NotRunning,
                _ => EngineError::QueueClosed,
            });
        }

        let id = JobId::new(self.next_job_id.increment(1) as u64);
        let mut job = Job::new(id, payload);
        if let Some(timeout) = timeout {
            job = job.with_timeout(timeout);
        }

        // Account for the job before it can reach a worker; the completion
        // barrier must never run ahead of the queue.
        self.counters.submitted.increment(1);
        self.wait_group.add(1);

        if self.job_tx.push(job).await.is_err() {
            // shutdown raced the gate, roll the accounting back
            self.counters.submitted.decrement(1);
            let _ = self.wait_group.done();
            return Err(EngineError::QueueClosed);
        }

        debug!(job = %id, "Job submitted");
        Ok(id)
    }

    /// Takes the result stream. May be called once per engine; a second
    /// call fails with [`EngineError::ContractViolation`].
    pub fn collect(&self) -> Result<ResultStream<R>, EngineError> {
        self.result_rx
            .lock()
            .take()
            .map(ResultStream::new)
            .ok_or_else(|| {
                EngineError::ContractViolation("collect() may only be called once".to_string())
            })
    }

    /// Shuts the engine down, returning `true` when every accepted job
    /// finished within the grace period.
    ///
    /// New submissions are rejected immediately. Jobs still queued and
    /// never claimed by a worker are turned into `Cancelled` results.
    /// In-flight jobs get `grace` to finish; whatever is still running
    /// afterwards is cancelled through its scope and its result is cut
    /// off. The result queue closes either way, so an active collector
    /// drains what was emitted and then observes the end of the stream.
    #[instrument(skip(self), fields(engine = %self.config.engine_id))]
    pub async fn shutdown(&self, grace: Duration) -> Result<bool, EngineError> {
        {
            let mut status = self.status.lock();
            if *status != EngineStatus::Running {
                return Err(EngineError::NotRunning);
            }
            *status = EngineStatus::Draining;
        }

        info!(grace_millis = grace.as_millis() as u64, "Engine shutting down");

        // Gate new submissions, then stop workers from claiming further
        // jobs. In-flight jobs keep running on their own scopes.
        self.accepting.clear();
        self.quiesce_guard.cancel();

        // Close the intake. Submissions that already passed the gate have
        // either landed in the queue or will observe the closure and roll
        // themselves back.
        self.job_tx.close()?;

        let drained = tokio::time::timeout(grace, async {
            self.drain_unclaimed().await;
            self.wait_group.wait().await;
        })
        .await
        .is_ok();

        if drained {
            debug!("All jobs accounted for");
            self.pool.join().await;
        } else {
            warn!(
                outstanding = self.wait_group.outstanding(),
                "Grace period expired, cutting off in-flight jobs"
            );
            self.abort_guard.cancel();
        }

        // End of the result stream. A worker still unwinding past this
        // point drops its result with a warning instead of blocking.
        self.result_tx.close()?;
        *self.status.lock() = EngineStatus::Stopped;

        info!(clean = drained, "Engine shut down");
        Ok(drained)
    }

    /// Turns every job still queued into a `Cancelled` result.
    async fn drain_unclaimed(&self) {
        while let Some(job) = self.job_rx.try_pop() {
            let id = job.id;
            self.counters.cancelled.increment(1);

            let result = JobResult::failure(id, JobError::Cancelled(CancelReason::Explicit), None);
            if self.result_tx.push(result).await.is_err() {
                warn!(job = %id, "Result dropped: result queue closed");
            }
            if let Err(error) = self.wait_group.done() {
                error!(job = %id, %error, "Job accounting violated");
            }
            debug!(job = %id, "Unclaimed job cancelled");
        }
    }

    /// Resizes the worker pool and returns the new target size.
    ///
    /// Growing spawns workers immediately; shrinking retires the newest
    /// workers after their current job. Scaling to zero pauses execution
    /// while submissions keep queueing.
    pub fn scale_pool(&self, target: usize) -> Result<usize, EngineError> {
        if self.status() != EngineStatus::Running {
            return Err(EngineError::NotRunning);
        }
        Ok(self.pool.scale_to(target))
    }

    /// The engine identifier used in logs
    pub fn id(&self) -> &str {
        &self.config.engine_id
    }

    /// The configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Live counters shared with the workers
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Jobs accepted and not yet finished, queued and in-flight alike
    pub fn active_jobs(&self) -> u64 {
        self.wait_group.outstanding()
    }

    /// Jobs queued and not yet claimed by a worker
    pub fn queued_jobs(&self) -> usize {
        self.job_rx.len()
    }

    /// Workers currently alive, including ones finishing their last job
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Phase of every live worker, keyed by worker id
    pub fn worker_phases(&self) -> Vec<(WorkerId, WorkerPhase)> {
        self.pool.phases()
    }
}

impl<T, R> Drop for Engine<T, R> {
    fn drop(&mut self) {
        // An engine dropped without shutdown would leave workers parked on
        // the queue forever. Firing the scopes lets them exit; both guards
        // are idempotent, so this is a no-op after a normal shutdown.
        self.quiesce_guard.cancel();
        self.abort_guard.cancel();
    }
}

impl<T, R> std::fmt::Debug for Engine<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = *self.status.lock();
        f.debug_struct("Engine")
            .field("id", &self.config.engine_id)
            .field("status", &status)
            .field("active_jobs", &self.wait_group.outstanding())
            .field("queued_jobs", &self.job_rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{FnHandler, JobContext};

    fn echo_engine(config: EngineConfig) -> Engine<u64, u64> {
        let handler = FnHandler::new(|ctx: JobContext<u64>| async move { Ok(*ctx.payload()) });
        Engine::new(config, handler).unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = EngineConfig::new().with_worker_count(0);
        let handler = FnHandler::new(|ctx: JobContext<u64>| async move { Ok(*ctx.payload()) });

        let result = Engine::<u64, u64>::new(config, handler);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_before_start_fails() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("gate"));
        let error = engine.submit(1).await.unwrap_err();
        assert!(matches!(error, EngineError::NotRunning));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("restart"));
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

        engine.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_start_fails() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("early"));
        let error = engine.shutdown(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(error, EngineError::NotRunning));
    }

    #[tokio::test]
    async fn test_scale_before_start_fails() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("scale"));
        assert!(matches!(engine.scale_pool(2), Err(EngineError::NotRunning)));
    }

    #[tokio::test]
    async fn test_collect_is_single_use() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("collect"));
        let _stream = engine.collect().unwrap();
        assert!(matches!(
            engine.collect(),
            Err(EngineError::ContractViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_status_progression() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("lifecycle"));
        assert_eq!(engine.status(), EngineStatus::Idle);

        engine.start().unwrap();
        assert_eq!(engine.status(), EngineStatus::Running);

        let clean = engine.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(clean);
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert_eq!(engine.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("closed"));
        engine.start().unwrap();
        engine.shutdown(Duration::from_secs(1)).await.unwrap();

        let error = engine.submit(7).await.unwrap_err();
        assert!(matches!(error, EngineError::QueueClosed));

        let error = engine.shutdown(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(error, EngineError::NotRunning));
    }

    #[tokio::test]
    async fn test_job_ids_are_sequential() {
        let engine = echo_engine(EngineConfig::new().with_engine_id("ids"));
        engine.start().unwrap();

        let first = engine.submit(1).await.unwrap();
        let second = engine.submit(2).await.unwrap();
        assert!(second > first);
        assert_eq!(second.as_u64(), first.as_u64() + 1);

        engine.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_display_formats() {
        assert_eq!(EngineStatus::Idle.to_string(), "idle");
        assert_eq!(EngineStatus::Running.to_string(), "running");
        assert_eq!(EngineStatus::Draining.to_string(), "draining");
        assert_eq!(EngineStatus::Stopped.to_string(), "stopped");
    }
}

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cancel::{CancelGuard, CancelScope};
use crate::engine::EngineCounters;
use crate::job::{Job, JobResult, SharedHandler};
use crate::queue::{QueueReceiver, QueueSender};
use crate::rate::RateLimiter;
use crate::sync::{AtomicCounter, WaitGroup};

use super::runner::{self, WorkerContext, WorkerId, WorkerPhase};

/// Everything the pool shares with the workers it spawns.
pub(crate) struct PoolContext<T, R> {
    pub(crate) jobs: QueueReceiver<Job<T>>,
    pub(crate) results: QueueSender<JobResult<R>>,
    pub(crate) handler: SharedHandler<T, R>,
    pub(crate) limiter: Option<Arc<RateLimiter>>,
    pub(crate) quiesce: CancelScope,
    pub(crate) abort: CancelScope,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) wait_group: Arc<WaitGroup>,
    pub(crate) counters: Arc<EngineCounters>,
}

/// Book-keeping for one spawned worker.
struct WorkerHandle {
    id: WorkerId,
    phase: Arc<AtomicU8>,
    /// Observer for the retirement signal; used to synthesize `Stopping`.
    stop_scope: CancelScope,
    /// Fires the retirement signal.
    stop: CancelGuard,
    join: JoinHandle<()>,
}

/// A dynamically sized set of workers draining one job queue.
///
/// Workers are spawned and retired through [`scale_to`](Self::scale_to).
/// Retirement is cooperative: a retired worker finishes its current job,
/// emits its result, and only then leaves, so resizing never loses work.
pub struct WorkerPool<T, R> {
    context: PoolContext<T, R>,
    workers: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicCounter,
}

impl<T, R> WorkerPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(context: PoolContext<T, R>) -> Self {
        Self {
            context,
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicCounter::new(0),
        }
    }

    /// Grows or shrinks the pool to `target` workers and returns `target`.
    ///
    /// Growing spawns workers that start claiming immediately. Shrinking
    /// signals the newest workers to retire after their current job; their
    /// in-flight work always completes. A `target` of zero pauses claiming
    /// entirely while submissions keep queueing.
    ///
    /// Must be called within a Tokio runtime.
    pub fn scale_to(&self, target: usize) -> usize {
        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.join.is_finished());

        let alive = workers
            .iter()
            .filter(|handle| !handle.stop_scope.is_cancelled())
            .count();

        if target > alive {
            let grow = target - alive;
            for _ in 0..grow {
                self.spawn_worker(&mut workers);
            }
            info!(target, grown = grow, "Scaled worker pool up");
        } else if target < alive {
            let mut to_retire = alive - target;
            // newest workers retire first
            for handle in workers.iter().rev() {
                if to_retire == 0 {
                    break;
                }
                if handle.stop_scope.is_cancelled() {
                    continue;
                }
                handle.stop.cancel();
                debug!(worker = handle.id, "Worker retirement signalled");
                to_retire -= 1;
            }
            info!(target, retired = alive - target, "Scaled worker pool down");
        }

        target
    }

    /// Workers that are neither retired nor signalled to retire.
    pub fn worker_count(&self) -> usize {
        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.join.is_finished());
        workers
            .iter()
            .filter(|handle| !handle.stop_scope.is_cancelled())
            .count()
    }

    /// Snapshot of every tracked worker and its phase, retiring ones
    /// included.
    pub fn phases(&self) -> Vec<(WorkerId, WorkerPhase)> {
        let workers = self.workers.lock();
        workers
            .iter()
            .map(|handle| {
                let mut phase = WorkerPhase::from_u8(handle.phase.load(Ordering::SeqCst));
                if phase != WorkerPhase::Stopped && handle.stop_scope.is_cancelled() {
                    phase = WorkerPhase::Stopping;
                }
                (handle.id, phase)
            })
            .collect()
    }

    /// Waits for every spawned worker task to exit.
    ///
    /// Only meaningful once the job queue is closed or all workers were
    /// signalled; otherwise they keep serving jobs indefinitely.
    pub(crate) async fn join(&self) {
        let drained: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };
        for handle in drained {
            if let Err(error) = handle.join.await {
                // job panics are contained inside the loop, so this is a
                // runtime-level failure
                error!(worker = handle.id, %error, "Worker task failed to join");
            }
        }
    }

    fn spawn_worker(&self, workers: &mut Vec<WorkerHandle>) {
        let id = self.next_worker_id.increment(1) as WorkerId;
        let (stop_scope, stop) = self.context.quiesce.child();
        let phase = Arc::new(AtomicU8::new(WorkerPhase::Idle as u8));

        let context = WorkerContext {
            id,
            jobs: self.context.jobs.clone(),
            results: self.context.results.clone(),
            handler: self.context.handler.clone(),
            limiter: self.context.limiter.clone(),
            quiesce: self.context.quiesce.clone(),
            stop: stop_scope.clone(),
            abort: self.context.abort.clone(),
            default_timeout: self.context.default_timeout,
            wait_group: self.context.wait_group.clone(),
            counters: self.context.counters.clone(),
            phase: phase.clone(),
        };
        let join = tokio::spawn(runner::run(context));
        debug!(worker = id, "Worker spawned");

        workers.push(WorkerHandle {
            id,
            phase,
            stop_scope,
            stop,
            join,
        });
    }
}

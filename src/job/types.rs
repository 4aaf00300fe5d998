use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelReason;
use crate::worker::WorkerId;

/// Identifier of a submitted job, unique within one engine and allocated
/// in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// A unit of work travelling from submission to a worker.
#[derive(Debug)]
pub struct Job<T> {
    pub(crate) id: JobId,
    pub(crate) payload: T,
    pub(crate) submitted_at: DateTime<Utc>,
    pub(crate) timeout: Option<Duration>,
}

impl<T> Job<T> {
    pub(crate) fn new(id: JobId, payload: T) -> Self {
        Self {
            id,
            payload,
            submitted_at: Utc::now(),
            timeout: None,
        }
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The job's identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// When the job was accepted.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Per-job deadline, if one overrides the engine default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// How a job ended when it did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The work function returned an error.
    #[error("job failed: {0}")]
    Failed(String),
    /// The work function panicked; the panic was contained at the worker
    /// boundary and the worker kept running.
    #[error("job panicked: {0}")]
    Panicked(String),
    /// The job was cancelled before or while running.
    #[error("job cancelled: {0}")]
    Cancelled(CancelReason),
    /// The job's own deadline expired while it was running.
    #[error("job timed out")]
    TimedOut,
}

impl JobError {
    /// True when the outcome was imposed on the job (cancellation or
    /// deadline) rather than produced by the work function.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, JobError::Cancelled(_) | JobError::TimedOut)
    }
}

/// Outcome of one job, emitted on the result queue in completion order.
///
/// Every accepted job produces exactly one of these, whether it ran to
/// completion, failed, panicked, or was cancelled before a worker ever
/// picked it up.
#[derive(Debug)]
pub struct JobResult<R> {
    /// The job this outcome belongs to.
    pub job_id: JobId,
    /// The produced value, or how the job ended instead.
    pub outcome: Result<R, JobError>,
    /// Worker that ran the job; `None` if it never reached one.
    pub worker: Option<WorkerId>,
    /// When the outcome was decided.
    pub completed_at: DateTime<Utc>,
}

impl<R> JobResult<R> {
    pub(crate) fn success(job_id: JobId, value: R, worker: WorkerId) -> Self {
        Self {
            job_id,
            outcome: Ok(value),
            worker: Some(worker),
            completed_at: Utc::now(),
        }
    }

    pub(crate) fn failure(job_id: JobId, error: JobError, worker: Option<WorkerId>) -> Self {
        Self {
            job_id,
            outcome: Err(error),
            worker,
            completed_at: Utc::now(),
        }
    }

    /// Whether the job produced a value.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Whether the outcome was imposed by cancellation or a deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.outcome, Err(error) if error.is_cancellation())
    }

    /// The produced value, if any.
    pub fn value(&self) -> Option<&R> {
        self.outcome.as_ref().ok()
    }

    /// The error that ended the job, if any.
    pub fn error(&self) -> Option<&JobError> {
        self.outcome.as_ref().err()
    }
}

use serde::Serialize;

use crate::sync::AtomicCounter;

/// Engine-wide accounting, updated lock-free by workers and the engine.
///
/// One instance lives in the engine and is shared by reference with every
/// collaborator; nothing global. `submitted` counts accepted jobs, the
/// other counters classify finished ones, so at any instant
/// `submitted - (completed + failed + panicked + cancelled + timed_out)`
/// is the number of jobs still in flight.
#[derive(Debug, Default)]
pub struct EngineCounters {
    /// Jobs accepted by `submit`.
    pub submitted: AtomicCounter,
    /// Jobs whose work function returned a value.
    pub completed: AtomicCounter,
    /// Jobs whose work function returned an error.
    pub failed: AtomicCounter,
    /// Jobs whose work function panicked.
    pub panicked: AtomicCounter,
    /// Jobs cancelled before or while running.
    pub cancelled: AtomicCounter,
    /// Jobs that hit their own deadline.
    pub timed_out: AtomicCounter,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A consistent-enough point-in-time copy for logs and assertions.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            submitted: self.submitted.load(),
            completed: self.completed.load(),
            failed: self.failed.load(),
            panicked: self.panicked.load(),
            cancelled: self.cancelled.load(),
            timed_out: self.timed_out.load(),
        }
    }
}

/// Plain-data copy of [`EngineCounters`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub submitted: i64,
    pub completed: i64,
    pub failed: i64,
    pub panicked: i64,
    pub cancelled: i64,
    pub timed_out: i64,
}

impl CounterSnapshot {
    /// Finished jobs of every kind.
    pub fn finished(&self) -> i64 {
        self.completed + self.failed + self.panicked + self.cancelled + self.timed_out
    }

    /// Jobs accepted but not yet finished.
    pub fn in_flight(&self) -> i64 {
        self.submitted - self.finished()
    }
}

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::task::AbortOnDropHandle;
use tracing::trace;

use crate::cancel::{CancelReason, CancelScope};

/// Rate-limiter errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// Invalid configuration
    #[error("invalid rate limiter configuration: {0}")]
    InvalidConfig(String),

    /// The wait for a token was abandoned because the scope fired
    #[error("rate limit wait cancelled: {0}")]
    Cancelled(CancelReason),
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Time between token refills
    #[serde(with = "duration_millis")]
    pub interval: Duration,

    /// Tokens available immediately on an idle limiter (0 = strict pacing,
    /// every acquisition waits for a tick)
    pub burst: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100), // 10 jobs/sec steady state
            burst: 0,                             // no head start
        }
    }
}

impl RateLimiterConfig {
    /// Creates a configuration pacing one token every `interval`, with
    /// `burst` tokens available upfront
    pub fn new(interval: Duration, burst: usize) -> Self {
        Self { interval, burst }
    }

    /// Set the refill interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the burst capacity
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RateError> {
        if self.interval.is_zero() {
            return Err(RateError::InvalidConfig(
                "interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Proof that one token was consumed; carries when it was issued.
#[derive(Debug, Clone, Copy)]
pub struct RateToken {
    issued_at: Instant,
}

impl RateToken {
    /// When the token was handed out.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

/// Paces job starts by handing out tokens at a steady interval.
///
/// A background task adds one token per interval while the reservoir is
/// below capacity; ticks that find it full are discarded, so idle time
/// never builds up more than the configured burst. Dropping the limiter
/// stops the refill task.
///
/// Callers wait in [`acquire`](Self::acquire), racing the wait against a
/// [`CancelScope`] so shutdown never strands a worker in the token queue.
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    capacity: usize,
    config: RateLimiterConfig,
    _refill: AbortOnDropHandle<()>,
}

impl RateLimiter {
    /// Creates a limiter and starts its refill task.
    ///
    /// Must be called within a Tokio runtime. A `burst` of zero still
    /// allows one token in flight at a time; it just starts empty.
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = config.burst.max(1);
        let prefill = config.burst;
        // A zero interval would turn the refill loop into a busy spin;
        // validation rejects it upstream, this is the hard floor.
        let interval = config.interval.max(Duration::from_millis(1));

        let tokens = Arc::new(Semaphore::new(prefill));
        let refill = tokio::spawn(refill_loop(tokens.clone(), capacity, interval));

        Self {
            tokens,
            capacity,
            config,
            _refill: AbortOnDropHandle::new(refill),
        }
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Tokens available right now.
    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    /// Waits for one token, racing the wait against `scope`.
    ///
    /// Returns immediately with [`RateError::Cancelled`] if the scope has
    /// already fired. The token is consumed, never returned: a caller that
    /// acquires and then does nothing still spent it.
    pub async fn acquire(&self, scope: &CancelScope) -> Result<RateToken, RateError> {
        tokio::select! {
            biased;
            _ = scope.cancelled() => {
                Err(RateError::Cancelled(
                    scope.reason().unwrap_or(CancelReason::Explicit),
                ))
            }
            permit = self.tokens.acquire() => {
                // The semaphore is never closed, so acquisition cannot fail.
                let permit = permit.expect("rate limiter semaphore is never closed");
                permit.forget();
                trace!(available = self.available(), "rate token issued");
                Ok(RateToken { issued_at: Instant::now() })
            }
        }
    }

    /// Takes a token only if one is available right now.
    pub fn try_acquire(&self) -> Option<RateToken> {
        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Some(RateToken {
                    issued_at: Instant::now(),
                })
            }
            Err(_) => None,
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("available", &self.available())
            .field("capacity", &self.capacity)
            .field("interval", &self.config.interval)
            .finish()
    }
}

/// Adds one token per tick while the reservoir is below capacity.
async fn refill_loop(tokens: Arc<Semaphore>, capacity: usize, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    // A delayed tick must not produce a catch-up burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if tokens.available_permits() < capacity {
            tokens.add_permits(1);
        }
    }
}

// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

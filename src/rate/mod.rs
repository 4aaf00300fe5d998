//! Token-bucket rate limiting
//!
//! [`RateLimiter`] meters how often workers may start jobs. Tokens
//! accumulate at a fixed interval up to a configurable burst capacity;
//! each job start consumes one. An idle limiter therefore allows a burst
//! before throttling to the steady rate, and a saturated one never stores
//! more than its capacity; unused refill ticks are discarded, not
//! banked.

mod limiter;

pub use limiter::{RateError, RateLimiter, RateLimiterConfig, RateToken};

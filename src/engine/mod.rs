//! The engine facade: submission, collection, scaling, shutdown
//!
//! [`Engine`] wires the queues, the worker pool, the optional rate
//! limiter, and the cancellation scopes into one unit with a small
//! surface determined by [`EngineConfig`]:
//!
//! - [`Engine::submit`] accepts payloads, applying queue backpressure
//! - [`Engine::collect`] hands out the single [`ResultStream`]
//! - [`Engine::scale_pool`] resizes the pool in either direction
//! - [`Engine::shutdown`] drains gracefully within a grace period, then
//!   cuts off whatever is left
//!
//! Progress is visible through [`EngineCounters`] and the status/queue
//! accessors; nothing is global.

mod collector;
mod config;
mod core;
mod counters;

pub use collector::ResultStream;
pub use config::{ConfigError, EngineConfig};
pub use core::{Engine, EngineError, EngineStatus};
pub use counters::{CounterSnapshot, EngineCounters};

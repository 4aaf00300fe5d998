//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::rate::{RateError, RateLimiterConfig};

/// Errors raised while validating an engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field holds a value the engine cannot run with
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The embedded rate limiter configuration is invalid
    #[error(transparent)]
    Rate(#[from] RateError),
}

/// Configuration for an [`Engine`](super::Engine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identifier used in logs and spans
    pub engine_id: String,

    /// Number of workers started by `start()`
    pub worker_count: usize,

    /// Capacity of the job and result queues, zero meaning rendezvous
    /// hand-off where every submit waits for a pop
    pub queue_capacity: usize,

    /// Pacing applied to job starts, unlimited when absent
    pub rate: Option<RateLimiterConfig>,

    /// Deadline applied to jobs submitted without their own
    #[serde(with = "option_duration_millis")]
    pub default_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_id: format!("engine-{}", Uuid::now_v7()),
            worker_count: 4,        // modest parallelism
            queue_capacity: 64,     // absorbs bursts without hoarding
            rate: None,             // unlimited
            default_timeout: None,  // jobs run to completion
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values and a fresh engine id
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine identifier
    pub fn with_engine_id(mut self, engine_id: impl Into<String>) -> Self {
        self.engine_id = engine_id.into();
        self
    }

    /// Sets the number of workers
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Sets the queue capacity
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Enables rate limiting of job starts
    pub fn with_rate(mut self, rate: RateLimiterConfig) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Sets the default per-job timeout
    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = Some(default_timeout);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "engine_id must not be empty".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(ConfigError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }

        if let Some(timeout) = self.default_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "default_timeout must be greater than zero".to_string(),
                ));
            }
        }

        if let Some(rate) = &self.rate {
            rate.validate()?;
        }

        Ok(())
    }
}

mod option_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.engine_id.starts_with("engine-"));
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity, 64);
        assert!(config.rate.is_none());
        assert!(config.default_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::new()
            .with_engine_id("imports")
            .with_worker_count(8)
            .with_queue_capacity(256)
            .with_rate(RateLimiterConfig::new(Duration::from_millis(50), 5))
            .with_default_timeout(Duration::from_secs(30));

        assert_eq!(config.engine_id, "imports");
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(
            config.rate,
            Some(RateLimiterConfig::new(Duration::from_millis(50), 5))
        );
        assert_eq!(config.default_timeout, Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_engine_id() {
        let config = EngineConfig::new().with_engine_id("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(message)) if message.contains("engine_id")
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = EngineConfig::new().with_worker_count(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(message)) if message.contains("worker_count")
        ));
    }

    #[test]
    fn test_validate_rejects_zero_default_timeout() {
        let config = EngineConfig::new().with_default_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(message)) if message.contains("default_timeout")
        ));
    }

    #[test]
    fn test_validate_bubbles_rate_errors() {
        let config = EngineConfig::new().with_rate(RateLimiterConfig::new(Duration::ZERO, 3));
        assert!(matches!(config.validate(), Err(ConfigError::Rate(_))));
    }

    #[test]
    fn test_zero_queue_capacity_is_allowed() {
        let config = EngineConfig::new().with_queue_capacity(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = EngineConfig::new()
            .with_engine_id("round-trip")
            .with_worker_count(2)
            .with_rate(RateLimiterConfig::new(Duration::from_millis(20), 1))
            .with_default_timeout(Duration::from_millis(1500));

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"default_timeout\":1500"));

        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_optional_fields_deserialize_as_none() {
        let json = r#"{
            "engine_id": "bare",
            "worker_count": 1,
            "queue_capacity": 8,
            "rate": null,
            "default_timeout": null
        }"#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert!(config.rate.is_none());
        assert!(config.default_timeout.is_none());
    }
}

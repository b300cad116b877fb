//! # Harvest Engine Configuration
//!
//! Every tunable the engine consults lives here: simulated failure model,
//! retry/backoff policy, loading timeouts, cache TTLs and event capacity.
//! Defaults are the single source of truth; files and environment variables
//! layer on top of them (see [`ConfigManager`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use harvest_engine::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retries = manager.config().retry.max_retries;
//! let timeout = manager.config().loading.default_timeout();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::error::{HarvestError, Result};
use crate::loading::OperationType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure mirroring harvest.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Step executor failure model and pacing
    pub execution: ExecutionSettings,

    /// Retry and backoff policy for infrastructure errors
    pub retry: RetrySettings,

    /// Loading state coordination
    pub loading: LoadingSettings,

    /// In-memory response cache
    pub cache: CacheSettings,

    /// Live fetch behaviour
    pub network: NetworkSettings,

    /// Lifecycle event channel
    pub events: EventSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub failure_probability: f64,
    pub slippage_probability: f64,
    pub step_delay_min_ms: u64,
    pub step_delay_max_ms: u64,
    /// Failure probability applied on retry runs; `None` keeps the initial model
    pub retry_failure_probability: Option<f64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            failure_probability: 0.1,
            slippage_probability: 0.05,
            step_delay_min_ms: 1500,
            step_delay_max_ms: 2500,
            retry_failure_probability: Some(0.05),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 15_000,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadingSettings {
    /// Zero disables the timeout timer
    pub default_timeout_ms: u64,
    pub global_operation_types: Vec<OperationType>,
}

impl LoadingSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for LoadingSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 8000,
            global_operation_types: vec![OperationType::Navigation],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub default_ttl_ms: u64,
    pub max_entries: usize,
    pub stale_ratio: f64,
    pub sweep_interval_ms: u64,
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            max_entries: 100,
            stale_ratio: 0.8,
            sweep_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub fetch_timeout_ms: u64,
    pub allow_stale: bool,
}

impl NetworkSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            allow_stale: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventSettings {
    pub channel_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

fn check_probability(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(HarvestError::Configuration(format!(
            "{field} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

impl HarvestConfig {
    /// Validate cross-field constraints after all layers are merged
    pub fn validate(&self) -> Result<()> {
        check_probability("execution.failure_probability", self.execution.failure_probability)?;
        check_probability(
            "execution.slippage_probability",
            self.execution.slippage_probability,
        )?;
        if let Some(retry_probability) = self.execution.retry_failure_probability {
            check_probability("execution.retry_failure_probability", retry_probability)?;
        }

        if self.execution.step_delay_min_ms > self.execution.step_delay_max_ms {
            return Err(HarvestError::Configuration(format!(
                "execution.step_delay_min_ms ({}) exceeds step_delay_max_ms ({})",
                self.execution.step_delay_min_ms, self.execution.step_delay_max_ms
            )));
        }

        if self.retry.retry_delay_ms > self.retry.max_retry_delay_ms {
            return Err(HarvestError::Configuration(format!(
                "retry.retry_delay_ms ({}) exceeds max_retry_delay_ms ({})",
                self.retry.retry_delay_ms, self.retry.max_retry_delay_ms
            )));
        }

        if !(self.cache.stale_ratio > 0.0 && self.cache.stale_ratio <= 1.0) {
            return Err(HarvestError::Configuration(format!(
                "cache.stale_ratio must be within (0, 1], got {}",
                self.cache.stale_ratio
            )));
        }

        if self.cache.max_entries == 0 {
            return Err(HarvestError::Configuration(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(HarvestError::Configuration(
                "events.channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

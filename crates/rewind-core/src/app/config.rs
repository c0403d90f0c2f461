//! ManagerConfig - timing knobs of the manager and its sweeper.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Manager configuration. All durations are milliseconds.
///
/// ```ignore
/// let config = ManagerConfig::from_json(r#"{ "staleness_threshold_ms": 5000 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Pause between sweeper passes.
    pub sweep_interval_ms: u64,
    /// PROGRESSING records untouched for this long are considered abandoned.
    pub staleness_threshold_ms: u64,
    /// COMPENSATION_FAILED records older than this are reported as stuck.
    pub stuck_report_threshold_ms: u64,
    /// SUCCESSFUL / COMPENSATED records older than this are purged. `None` keeps them.
    pub retention_ms: Option<u64>,
    /// How long `stop()` waits for open process handles.
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("stuck_report_threshold_ms ({stuck}) must not be below staleness_threshold_ms ({staleness})")]
    StuckBeforeStale { stuck: u64, staleness: u64 },
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 10_000,
            staleness_threshold_ms: 60_000,
            stuck_report_threshold_ms: 300_000,
            retention_ms: None,
            shutdown_grace_ms: 30_000,
        }
    }
}

impl ManagerConfig {
    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Zero("sweep_interval_ms"));
        }
        if self.staleness_threshold_ms == 0 {
            return Err(ConfigError::Zero("staleness_threshold_ms"));
        }
        if self.retention_ms == Some(0) {
            return Err(ConfigError::Zero("retention_ms"));
        }
        if self.stuck_report_threshold_ms < self.staleness_threshold_ms {
            return Err(ConfigError::StuckBeforeStale {
                stuck: self.stuck_report_threshold_ms,
                staleness: self.staleness_threshold_ms,
            });
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn staleness_threshold(&self) -> chrono::Duration {
        millis(self.staleness_threshold_ms)
    }

    pub fn stuck_report_threshold(&self) -> chrono::Duration {
        millis(self.stuck_report_threshold_ms)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_ms.map(millis)
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

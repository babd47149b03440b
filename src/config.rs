//! Queue configuration
//!
//! All timing knobs are externally supplied, never hard-coded at use
//! sites: worker pool size, per-job wall-clock budget, heartbeat cadence,
//! and the staleness threshold the reaper compares against. Values can be
//! overridden from a TOML file; unset fields keep the built-in defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Effective queue configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Worker pool size (default: 8)
    pub workers: usize,

    /// Per-job wall-clock budget in seconds (default: 60)
    pub max_runtime_seconds: u64,

    /// Heartbeat refresh cadence in seconds (default: 2)
    pub heartbeat_interval_seconds: u64,

    /// Heartbeat age after which an active job is presumed abandoned
    /// (default: 30)
    pub stale_after_seconds: u64,

    /// How long an idle worker blocks per claim attempt before re-checking
    /// shutdown (default: 5)
    pub claim_wait_seconds: u64,

    /// Average job duration used for the estimated-wait heuristic
    /// (default: 20)
    pub avg_job_seconds: u64,

    /// How long terminal records are retained before pruning
    /// (default: 3600)
    pub retention_seconds: u64,

    /// Minimum gap between passive reaper checks driven from the queue
    /// API (default: 5)
    pub reap_interval_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_runtime_seconds: 60,
            heartbeat_interval_seconds: 2,
            stale_after_seconds: 30,
            claim_wait_seconds: 5,
            avg_job_seconds: 20,
            retention_seconds: 3600,
            reap_interval_seconds: 5,
        }
    }
}

/// TOML overlay: every field optional, unset keeps the default.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverlay {
    workers: Option<usize>,
    max_runtime_seconds: Option<u64>,
    heartbeat_interval_seconds: Option<u64>,
    stale_after_seconds: Option<u64>,
    claim_wait_seconds: Option<u64>,
    avg_job_seconds: Option<u64>,
    retention_seconds: Option<u64>,
    reap_interval_seconds: Option<u64>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("workers must be in (0, 256], got {value}")]
    WorkersOutOfBounds { value: usize },

    #[error("max_runtime_seconds must be in (0, 86400], got {value}")]
    RuntimeOutOfBounds { value: u64 },

    #[error("heartbeat_interval_seconds must be positive")]
    HeartbeatZero,

    #[error(
        "heartbeat_interval_seconds ({interval}) must be at most half of \
         stale_after_seconds ({stale})"
    )]
    HeartbeatTooSlow { interval: u64, stale: u64 },

    #[error("claim_wait_seconds must be in (0, 60], got {value}")]
    ClaimWaitOutOfBounds { value: u64 },

    #[error("avg_job_seconds must be positive")]
    AvgJobZero,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl QueueConfig {
    /// Validate the configuration bounds.
    ///
    /// The heartbeat cadence must be at most half the staleness threshold,
    /// otherwise a single delayed refresh on a live worker would trip the
    /// reaper.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 || self.workers > 256 {
            return Err(ConfigError::WorkersOutOfBounds {
                value: self.workers,
            });
        }
        if self.max_runtime_seconds == 0 || self.max_runtime_seconds > 86400 {
            return Err(ConfigError::RuntimeOutOfBounds {
                value: self.max_runtime_seconds,
            });
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::HeartbeatZero);
        }
        // interval * 2 <= stale, in division form so extreme configured
        // values cannot overflow
        if self.heartbeat_interval_seconds > self.stale_after_seconds / 2 {
            return Err(ConfigError::HeartbeatTooSlow {
                interval: self.heartbeat_interval_seconds,
                stale: self.stale_after_seconds,
            });
        }
        if self.claim_wait_seconds == 0 || self.claim_wait_seconds > 60 {
            return Err(ConfigError::ClaimWaitOutOfBounds {
                value: self.claim_wait_seconds,
            });
        }
        if self.avg_job_seconds == 0 {
            return Err(ConfigError::AvgJobZero);
        }
        Ok(())
    }

    /// Load defaults overlaid with a TOML file, then validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let overlay: ConfigOverlay =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let defaults = Self::default();
        let config = Self {
            workers: overlay.workers.unwrap_or(defaults.workers),
            max_runtime_seconds: overlay
                .max_runtime_seconds
                .unwrap_or(defaults.max_runtime_seconds),
            heartbeat_interval_seconds: overlay
                .heartbeat_interval_seconds
                .unwrap_or(defaults.heartbeat_interval_seconds),
            stale_after_seconds: overlay
                .stale_after_seconds
                .unwrap_or(defaults.stale_after_seconds),
            claim_wait_seconds: overlay
                .claim_wait_seconds
                .unwrap_or(defaults.claim_wait_seconds),
            avg_job_seconds: overlay.avg_job_seconds.unwrap_or(defaults.avg_job_seconds),
            retention_seconds: overlay
                .retention_seconds
                .unwrap_or(defaults.retention_seconds),
            reap_interval_seconds: overlay
                .reap_interval_seconds
                .unwrap_or(defaults.reap_interval_seconds),
        };
        config.validate()?;
        Ok(config)
    }

    /// Per-job wall-clock budget.
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.max_runtime_seconds)
    }

    /// Heartbeat refresh cadence.
    pub fn heartbeat_cadence(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Heartbeat staleness threshold.
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }

    /// Per-attempt claim wait.
    pub fn claim_wait(&self) -> Duration {
        Duration::from_secs(self.claim_wait_seconds)
    }

    /// Terminal record retention window.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    /// Minimum gap between passive reaper checks.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_seconds)
    }
}

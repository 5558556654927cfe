//! Engine timing configuration.
//!
//! Every knob has a fixed default. A JSON file may override any of them using
//! millisecond keys (`stallThresholdMs`, `retentionMs`, `reapIntervalMs`,
//! `killGraceMs`, `runTimeoutMs`); unknown keys are rejected.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::consts::{
    DEFAULT_KILL_GRACE, DEFAULT_REAP_INTERVAL, DEFAULT_RETENTION, DEFAULT_RUN_TIMEOUT,
    DEFAULT_STALL_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Idle time after which a running job is reported as stalled.
    pub stall_threshold: Duration,
    /// Age after which a terminal job is reaped.
    pub retention: Duration,
    /// Reaper tick.
    pub reap_interval: Duration,
    /// Delay between graceful and forced termination.
    pub kill_grace: Duration,
    /// Bound on the synchronous `run_command` path.
    pub run_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            retention: DEFAULT_RETENTION,
            reap_interval: DEFAULT_REAP_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

/// Millisecond overrides, as found in a config file or on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverrides {
    pub stall_threshold_ms: Option<u64>,
    pub retention_ms: Option<u64>,
    pub reap_interval_ms: Option<u64>,
    pub kill_grace_ms: Option<u64>,
    pub run_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Values set in `other` win over values set in `self`.
    pub fn merge(self, other: ConfigOverrides) -> Self {
        Self {
            stall_threshold_ms: other.stall_threshold_ms.or(self.stall_threshold_ms),
            retention_ms: other.retention_ms.or(self.retention_ms),
            reap_interval_ms: other.reap_interval_ms.or(self.reap_interval_ms),
            kill_grace_ms: other.kill_grace_ms.or(self.kill_grace_ms),
            run_timeout_ms: other.run_timeout_ms.or(self.run_timeout_ms),
        }
    }
}

impl EngineConfig {
    /// Apply overrides on top of this config.
    pub fn with_overrides(self, o: ConfigOverrides) -> Self {
        let ms = Duration::from_millis;
        Self {
            stall_threshold: o.stall_threshold_ms.map(ms).unwrap_or(self.stall_threshold),
            retention: o.retention_ms.map(ms).unwrap_or(self.retention),
            reap_interval: o.reap_interval_ms.map(ms).unwrap_or(self.reap_interval),
            kill_grace: o.kill_grace_ms.map(ms).unwrap_or(self.kill_grace),
            run_timeout: o.run_timeout_ms.map(ms).unwrap_or(self.run_timeout),
        }
    }

    /// Parse overrides from a JSON string and apply them to the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::default().with_overrides(ConfigOverrides::from_json(json)?))
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::default().with_overrides(ConfigOverrides::load(path)?))
    }
}

impl ConfigOverrides {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid engine config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.stall_threshold, Duration::from_secs(30));
        assert_eq!(config.retention, Duration::from_secs(300));
        assert_eq!(config.reap_interval, Duration::from_secs(60));
        assert_eq!(config.kill_grace, Duration::from_secs(1));
    }

    #[test]
    fn empty_json_is_defaults() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = EngineConfig::from_json(r#"{"stallThresholdMs": 500, "killGraceMs": 50}"#)
            .unwrap();
        assert_eq!(config.stall_threshold, Duration::from_millis(500));
        assert_eq!(config.kill_grace, Duration::from_millis(50));
        assert_eq!(config.retention, Duration::from_secs(300));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = EngineConfig::from_json(r#"{"stallMs": 1}"#).unwrap_err();
        assert!(err.to_string().contains("invalid engine config"));
    }

    #[test]
    fn merge_prefers_later_values() {
        let file = ConfigOverrides {
            retention_ms: Some(1_000),
            reap_interval_ms: Some(100),
            ..ConfigOverrides::default()
        };
        let cli = ConfigOverrides {
            retention_ms: Some(2_000),
            ..ConfigOverrides::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.retention_ms, Some(2_000));
        assert_eq!(merged.reap_interval_ms, Some(100));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobsmith.json");
        std::fs::write(&path, r#"{"retentionMs": 10000, "reapIntervalMs": 1000}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.retention, Duration::from_secs(10));
        assert_eq!(config.reap_interval, Duration::from_secs(1));
    }

    #[test]
    fn load_missing_file_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}

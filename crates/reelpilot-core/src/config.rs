//! ReelPilot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Directory holding all persisted state (schedule, locks, ledger, logs).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Path to the generation pipeline executable.
    #[serde(default = "default_pipeline_bin")]
    pub pipeline_bin: String,
    /// Aggregate daily spend cap in USD across all accounts.
    #[serde(default = "default_daily_cap")]
    pub daily_cap: f64,
    /// Estimated cost of one pipeline run, used for admission control.
    #[serde(default = "default_run_cost")]
    pub run_cost_estimate: f64,
    /// Days a dispatch lock is kept before the sweep removes it.
    #[serde(default = "default_lock_retention")]
    pub lock_retention_days: u32,
    /// Seconds between dispatcher ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_data_dir() -> PathBuf {
    OrchestratorConfig::home_dir().join("data")
}
fn default_pipeline_bin() -> String {
    "autopilot".into()
}
fn default_daily_cap() -> f64 {
    5.00
}
fn default_run_cost() -> f64 {
    0.50
}
fn default_lock_retention() -> u32 {
    7
}
fn default_tick_secs() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pipeline_bin: default_pipeline_bin(),
            daily_cap: default_daily_cap(),
            run_cost_estimate: default_run_cost(),
            lock_retention_days: default_lock_retention(),
            tick_secs: default_tick_secs(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load config from the default path (~/.reelpilot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::ReelPilotError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::ReelPilotError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config.with_env_overrides())
    }

    /// Apply environment overrides (REELPILOT_DAILY_CAP).
    fn with_env_overrides(mut self) -> Self {
        if let Ok(cap) = std::env::var("REELPILOT_DAILY_CAP") {
            match cap.parse::<f64>() {
                Ok(v) if v >= 0.0 => self.daily_cap = v,
                _ => tracing::warn!("Ignoring invalid REELPILOT_DAILY_CAP value: {cap}"),
            }
        }
        self
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::ReelPilotError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the ReelPilot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".reelpilot")
    }

    pub fn schedule_path(&self) -> PathBuf {
        self.data_dir.join("schedule.json")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("daily_spend.json")
    }

    pub fn usage_path(&self) -> PathBuf {
        self.data_dir.join("asset_usage.jsonl")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.data_dir.join("runs.jsonl")
    }

    pub fn dispatch_history_path(&self) -> PathBuf {
        self.data_dir.join("dispatch_history.json")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8600
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.daily_cap, 5.00);
        assert_eq!(cfg.lock_retention_days, 7);
        assert_eq!(cfg.tick_secs, 60);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "pipeline_bin = \"/opt/pipeline/run\"\ndaily_cap = 12.5\n")
            .unwrap();
        let cfg = OrchestratorConfig::load_from(&path).unwrap();
        assert_eq!(cfg.pipeline_bin, "/opt/pipeline/run");
        assert_eq!(cfg.daily_cap, 12.5);
        // Untouched fields fall back to defaults
        assert_eq!(cfg.run_cost_estimate, 0.50);
    }

    #[test]
    fn test_corrupt_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not toml at all {{{{").unwrap();
        assert!(OrchestratorConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_derived_paths() {
        let cfg = OrchestratorConfig {
            data_dir: PathBuf::from("/tmp/rp"),
            ..Default::default()
        };
        assert_eq!(cfg.schedule_path(), PathBuf::from("/tmp/rp/schedule.json"));
        assert_eq!(cfg.locks_dir(), PathBuf::from("/tmp/rp/locks"));
        assert_eq!(cfg.ledger_path(), PathBuf::from("/tmp/rp/daily_spend.json"));
    }
}

//! Run configuration loaded from `tsmigrate.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::planner::WindowSizes;
use crate::orchestrator::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "tsmigrate.toml";

/// Environment variable consulted when `destination.token` is not set.
pub const TOKEN_ENV_VAR: &str = "TSMIGRATE_DESTINATION_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub windows: WindowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// InfluxDB 1.x connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub url: String,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// InfluxDB 2.x connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    pub url: String,
    pub org: String,
    #[serde(default)]
    pub token: Option<String>,
    /// How far back to look for the last written point.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_recovery_concurrency")]
    pub recovery_concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Measurements to migrate. Empty means every measurement in the source.
    #[serde(default)]
    pub measurements: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    #[serde(default = "default_window_minutes")]
    pub default_minutes: u32,
    /// Per-measurement window size in minutes.
    #[serde(default = "default_window_overrides")]
    pub overrides: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Directory for the daily migration log. No file log when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_lookback_days() -> u32 {
    365
}

fn default_concurrency() -> usize {
    5
}

fn default_recovery_concurrency() -> usize {
    1
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("writeobj.json")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_window_minutes() -> u32 {
    5
}

// The per-record volume of `Single` needs narrower windows to keep each read
// inside the request timeout.
fn default_window_overrides() -> BTreeMap<String, u32> {
    let mut overrides = BTreeMap::new();
    overrides.insert("Single".to_string(), 3);
    overrides
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            recovery_concurrency: default_recovery_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            checkpoint_file: default_checkpoint_file(),
            request_timeout_secs: default_request_timeout_secs(),
            measurements: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_window_minutes(),
            overrides: default_window_overrides(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.migration.concurrency == 0 {
            bail!("migration.concurrency must be at least 1");
        }
        if self.migration.recovery_concurrency == 0 {
            bail!("migration.recovery_concurrency must be at least 1");
        }
        if self.migration.retry_attempts == 0 {
            bail!("migration.retry_attempts must be at least 1");
        }
        if self.migration.request_timeout_secs == 0 {
            bail!("migration.request_timeout_secs must be at least 1");
        }
        if self.windows.default_minutes == 0 {
            bail!("windows.default_minutes must be at least 1");
        }
        if let Some((name, _)) = self.windows.overrides.iter().find(|(_, m)| **m == 0) {
            bail!("windows.overrides.{name} must be at least 1 minute");
        }
        Ok(())
    }

    /// Destination token from the file, falling back to the environment.
    pub fn destination_token(&self) -> Result<String> {
        if let Some(token) = self.destination.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => bail!(
                "No destination token configured. Set destination.token or {TOKEN_ENV_VAR}."
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.migration.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.migration.retry_attempts,
            Duration::from_secs(self.migration.retry_delay_secs),
        )
    }

    pub fn window_sizes(&self) -> WindowSizes {
        let minutes = |m: u32| chrono::Duration::minutes(i64::from(m));
        let mut sizes = WindowSizes::new(minutes(self.windows.default_minutes));
        for (measurement, m) in &self.windows.overrides {
            sizes = sizes.with_override(measurement, minutes(*m));
        }
        sizes
    }

    /// Apply the include/exclude lists to the measurements a source reports.
    pub fn select_measurements(&self, available: Vec<String>) -> Vec<String> {
        available
            .into_iter()
            .filter(|m| {
                self.migration.measurements.is_empty() || self.migration.measurements.contains(m)
            })
            .filter(|m| !self.migration.exclude.contains(m))
            .collect()
    }
}

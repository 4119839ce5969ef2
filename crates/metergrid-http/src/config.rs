//! Exporter configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default retention window for idle series.
pub const DEFAULT_METRIC_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolved exporter configuration.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// How long a series keeps being exposed without receiving
    /// updates before it is evicted.
    pub metric_timeout: Duration,
    /// Prefix removed from the front of each metric's namespace at
    /// emission time; the stored identity is untouched.
    pub trim_prefix: String,
    /// Skip the ingestion label sort. Only set this when every
    /// producer promises pre-sorted labels.
    pub unsorted_labels: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            metric_timeout: DEFAULT_METRIC_TIMEOUT,
            trim_prefix: String::new(),
            unsorted_labels: false,
        }
    }
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let raw: RawConfig = toml::from_str(&content)?;
        Ok(raw.resolve())
    }
}

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The on-disk TOML shape; every field optional, durations given as
/// strings like `"90s"` or `"2m"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub metric_timeout: Option<String>,
    pub trim_prefix: Option<String>,
    pub unsorted_labels: Option<bool>,
}

impl RawConfig {
    pub fn resolve(self) -> ExporterConfig {
        self.overlay(ExporterConfig::default())
    }

    /// Applies the set fields on top of `base`, leaving the rest
    /// untouched. Lets CLI flags override a config file.
    pub fn overlay(self, base: ExporterConfig) -> ExporterConfig {
        ExporterConfig {
            metric_timeout: self
                .metric_timeout
                .as_deref()
                .and_then(parse_duration)
                .unwrap_or(base.metric_timeout),
            trim_prefix: self.trim_prefix.unwrap_or(base.trim_prefix),
            unsorted_labels: self.unsorted_labels.unwrap_or(base.unsorted_labels),
        }
    }
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

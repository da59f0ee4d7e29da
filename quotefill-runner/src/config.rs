//! Session configuration.
//!
//! `SessionConfig` carries every tunable of a run with its documented
//! default. Files carry `SessionOverrides`, which name only what they change,
//! in seconds and `"HH:MM"` rather than `Duration`/`NaiveTime`.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use quotefill_core::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse session config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Everything the orchestrator and pool need to know about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Intraday polling stops once local time reaches this.
    pub closing_cutoff: NaiveTime,
    pub poll_interval: Duration,
    /// Sleep after a pass that failed on connectivity.
    pub connectivity_backoff: Duration,
    /// Unknown errors tolerated before a fatal abort.
    pub error_threshold: u32,
    /// Symbols aggregated at once.
    pub concurrency: usize,
    /// Row of the first symbol in the primary table.
    pub first_data_row: usize,
    /// Row of each symbol table that receives the copied snapshot.
    pub anchor_row: usize,
    /// Cells copied per symbol during classification (A..P).
    pub copy_columns: usize,
    pub reconfirm_final: bool,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            closing_cutoff: NaiveTime::from_hms_opt(13, 40, 0).unwrap_or(NaiveTime::MIN),
            poll_interval: Duration::from_secs(3),
            connectivity_backoff: Duration::from_secs(5),
            error_threshold: 2,
            concurrency: 6,
            first_data_row: 2,
            anchor_row: 5,
            copy_columns: 16,
            reconfirm_final: false,
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.concurrency == 0 {
            return invalid("concurrency", "must be at least 1");
        }
        if self.error_threshold == 0 {
            return invalid("error_threshold", "must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry_attempts", "must be at least 1");
        }
        if self.first_data_row < 2 {
            return invalid("first_data_row", "row 1 is the header");
        }
        if self.anchor_row == 0 {
            return invalid("anchor_row", "rows start at 1");
        }
        if self.copy_columns == 0 {
            return invalid("copy_columns", "must be at least 1");
        }
        if self.fetch_timeout.is_zero() {
            return invalid("fetch_timeout", "must be positive");
        }
        Ok(())
    }

    /// Defaults with the overrides of a TOML document applied.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let overrides: SessionOverrides = toml::from_str(content)?;
        overrides.apply(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }
}

/// The `[session]` table of a config file. Absent keys keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionOverrides {
    pub closing_cutoff: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub connectivity_backoff_secs: Option<u64>,
    pub error_threshold: Option<u32>,
    pub concurrency: Option<usize>,
    pub first_data_row: Option<usize>,
    pub anchor_row: Option<usize>,
    pub copy_columns: Option<usize>,
    pub reconfirm_final: Option<bool>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

impl SessionOverrides {
    /// Apply onto `base` and validate the result.
    pub fn apply(&self, base: SessionConfig) -> Result<SessionConfig, ConfigError> {
        let mut config = base;
        if let Some(cutoff) = &self.closing_cutoff {
            config.closing_cutoff = parse_time_of_day(cutoff)?;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connectivity_backoff_secs {
            config.connectivity_backoff = Duration::from_secs(secs);
        }
        if let Some(n) = self.error_threshold {
            config.error_threshold = n;
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(n) = self.first_data_row {
            config.first_data_row = n;
        }
        if let Some(n) = self.anchor_row {
            config.anchor_row = n;
        }
        if let Some(n) = self.copy_columns {
            config.copy_columns = n;
        }
        if let Some(flag) = self.reconfirm_final {
            config.reconfirm_final = flag;
        }
        if let Some(n) = self.retry_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(secs) = self.retry_delay_secs {
            config.retry.delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }
}

/// `"13:40"` or `"13:40:30"`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
        .map_err(|e| ConfigError::Invalid {
            field: "closing_cutoff",
            reason: format!("'{s}': {e}"),
        })
}

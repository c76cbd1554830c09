//! Operational settings loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use etftrack_daemon::{ScheduleConfig, default_data_dir};
use etftrack_fetch::ClientConfig;
use etftrack_ingest::{
    DEFAULT_EARLIEST_DATE, DEFAULT_WINDOW_MONTHS, EngineConfig, OrchestratorConfig, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the settings file.
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or has unknown keys.
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("Invalid setting '{key}': {reason}")]
    Invalid {
        /// The offending key.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Upper bound for `retry.max_delay_ms`.
const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1000;

/// Timer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    /// Seconds between scheduled updates.
    pub interval_secs: u64,
    /// Optional local time (`HH:MM`) of the first scheduled update.
    pub daily_at: Option<String>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            daily_at: None,
        }
    }
}

/// Retry settings for transient fetch failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempts per instrument, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Market-data source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    /// Base URL of the exchange website.
    pub base_url: String,
    /// Timeout for one HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Pause between monthly requests, in milliseconds.
    pub request_delay_ms: u64,
    /// User agent string.
    pub user_agent: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            base_url: client.base_url,
            request_timeout_secs: client.request_timeout.as_secs(),
            request_delay_ms: client.request_delay.as_millis() as u64,
            user_agent: client.user_agent,
        }
    }
}

/// All operational settings. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding series files, snapshots and run history.
    pub data_dir: PathBuf,
    /// Instrument registry JSON file; the built-in list is used when unset.
    pub registry: Option<PathBuf>,
    /// Lower bound of every backfill.
    pub earliest_date: NaiveDate,
    /// Instruments ingested at once.
    pub concurrency: usize,
    /// Limit for one fetch attempt or storage operation, in seconds.
    pub instrument_timeout_secs: u64,
    /// Calendar months requested per fetch attempt.
    pub fetch_window_months: u32,
    /// Limit for a whole fleet run, in seconds.
    pub run_deadline_secs: u64,
    /// Snapshots kept per instrument; 0 disables snapshots.
    pub max_snapshots: usize,
    /// Run reports kept in the history.
    pub keep_runs: usize,
    /// Timer settings.
    pub schedule: ScheduleSettings,
    /// Retry settings.
    pub retry: RetrySettings,
    /// Market-data source settings.
    pub source: SourceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            registry: None,
            earliest_date: DEFAULT_EARLIEST_DATE,
            concurrency: 4,
            instrument_timeout_secs: 120,
            fetch_window_months: DEFAULT_WINDOW_MONTHS,
            run_deadline_secs: 3600,
            max_snapshots: 30,
            keep_runs: 100,
            schedule: ScheduleSettings::default(),
            retry: RetrySettings::default(),
            source: SourceSettings::default(),
        }
    }
}

impl Settings {
    /// Parses and validates settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a TOML file.
    ///
    /// A relative `registry` path is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut settings = Self::from_toml(&content)?;

        if let (Some(registry), Some(dir)) = (&settings.registry, path.parent())
            && registry.is_relative()
        {
            settings.registry = Some(dir.join(registry));
        }
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Serializes the settings to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Checks every value for usability.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(())
            }
        };

        positive("concurrency", self.concurrency as u64)?;
        positive("instrument_timeout_secs", self.instrument_timeout_secs)?;
        positive("fetch_window_months", u64::from(self.fetch_window_months))?;
        positive("run_deadline_secs", self.run_deadline_secs)?;
        positive("schedule.interval_secs", self.schedule.interval_secs)?;
        positive("retry.max_attempts", u64::from(self.retry.max_attempts))?;
        positive("source.request_timeout_secs", self.source.request_timeout_secs)?;
        if self.retry.max_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid {
                key: "retry.max_delay_ms",
                reason: format!("must not exceed {MAX_RETRY_DELAY_MS} (one hour)"),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid {
                key: "retry.base_delay_ms",
                reason: "must not exceed retry.max_delay_ms".to_string(),
            });
        }
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "source.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        self.daily_at()?;
        Ok(())
    }

    /// Returns the parsed `schedule.daily_at` time.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not `HH:MM`.
    pub fn daily_at(&self) -> Result<Option<NaiveTime>, ConfigError> {
        self.schedule
            .daily_at
            .as_deref()
            .map(|s| {
                NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
                    key: "schedule.daily_at",
                    reason: format!("'{s}' is not HH:MM ({e})"),
                })
            })
            .transpose()
    }

    /// Ingestion engine configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            earliest: self.earliest_date,
            timeout: Duration::from_secs(self.instrument_timeout_secs),
            window_months: self.fetch_window_months,
            retry: RetryPolicy::new(
                self.retry.max_attempts,
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            ),
        }
    }

    /// Fleet orchestrator configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            concurrency: self.concurrency,
            run_deadline: Duration::from_secs(self.run_deadline_secs),
        }
    }

    /// Scheduler configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `schedule.daily_at` is invalid.
    pub fn schedule_config(&self) -> Result<ScheduleConfig, ConfigError> {
        Ok(ScheduleConfig {
            interval: Duration::from_secs(self.schedule.interval_secs),
            daily_at: self.daily_at()?,
        })
    }

    /// TWSE client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.source.base_url.clone(),
            request_timeout: Duration::from_secs(self.source.request_timeout_secs),
            request_delay: Duration::from_millis(self.source.request_delay_ms),
            user_agent: self.source.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.earliest_date, NaiveDate::from_ymd_opt(2010, 1, 4).unwrap());
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.schedule.interval_secs, 86_400);
        assert!(settings.registry.is_none());

        let engine = settings.engine_config();
        let defaults = EngineConfig::default();
        assert_eq!(engine.earliest, defaults.earliest);
        assert_eq!(engine.timeout, defaults.timeout);
        assert_eq!(engine.window_months, defaults.window_months);
        assert_eq!(engine.retry, defaults.retry);
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml(
            r#"
            data_dir = "/tmp/etf"
            registry = "/etc/etftrack/instruments.json"
            earliest_date = "2015-01-05"
            concurrency = 8
            max_snapshots = 0
            fetch_window_months = 6

            [schedule]
            interval_secs = 3600
            daily_at = "18:30"

            [retry]
            max_attempts = 5

            [source]
            request_delay_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/tmp/etf"));
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.max_snapshots, 0);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay_ms, 2_000);
        assert_eq!(
            settings.schedule_config().unwrap(),
            ScheduleConfig {
                interval: Duration::from_secs(3600),
                daily_at: NaiveTime::from_hms_opt(18, 30, 0),
            }
        );
        assert_eq!(settings.client_config().request_delay, Duration::ZERO);
        assert_eq!(settings.engine_config().retry.max_attempts, 5);
        assert_eq!(settings.engine_config().window_months, 6);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Settings::from_toml("concurency = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Settings::from_toml("concurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "concurrency", .. }));

        let err = Settings::from_toml("[schedule]\ndaily_at = \"6pm\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "schedule.daily_at", .. }));

        let err = Settings::from_toml("[retry]\nbase_delay_ms = 60000").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "retry.base_delay_ms", .. }));

        let err = Settings::from_toml("[retry]\nmax_delay_ms = 18446744073709551615").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "retry.max_delay_ms", .. }));

        let err = Settings::from_toml("fetch_window_months = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "fetch_window_months", .. }));
    }

    #[test]
    fn test_relative_registry_resolved_against_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("etftrack.toml");
        std::fs::write(&path, "registry = \"instruments.json\"").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.registry, Some(temp.path().join("instruments.json")));
    }

    #[test]
    fn test_toml_round_trip() {
        let settings = Settings::default();
        let parsed = Settings::from_toml(&settings.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, settings);
    }
}

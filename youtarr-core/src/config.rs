//! Runtime configuration.
//!
//! Values come from `YOUTARR_*` environment variables, optionally loaded from a
//! `.env` file, with a default for every field.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconcile::ReconcileOptions;
use crate::{Error, Result};

/// Prefix of every recognized environment variable.
pub const ENV_PREFIX: &str = "YOUTARR_";

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Root of the download tree.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Quality used by channels without their own setting.
    #[serde(default = "default_preferred_quality")]
    pub preferred_quality: String,

    /// Subfolder for channels that ask for the global default.
    #[serde(default)]
    pub default_subfolder: Option<String>,

    #[serde(default = "default_reconcile_time_budget_secs")]
    pub reconcile_time_budget_secs: u64,

    #[serde(default = "default_reconcile_chunk_size")]
    pub reconcile_chunk_size: usize,

    #[serde(default = "default_reconcile_update_batch_size")]
    pub reconcile_update_batch_size: usize,

    #[serde(default = "default_existence_recheck_hours")]
    pub existence_recheck_hours: u64,

    /// Daily window for reconciliation, e.g. "03:30-05:00". `None` allows any time.
    #[serde(default = "default_reconcile_window")]
    pub reconcile_window: Option<String>,

    #[serde(default = "default_scheduler_check_interval_secs")]
    pub scheduler_check_interval_secs: u64,
}

fn default_database_url() -> String {
    "sqlite:youtarr.db?mode=rwc".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/usr/src/app/data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_preferred_quality() -> String {
    crate::grouping::DEFAULT_QUALITY.to_string()
}

fn default_reconcile_time_budget_secs() -> u64 {
    300
}

fn default_reconcile_chunk_size() -> usize {
    1000
}

fn default_reconcile_update_batch_size() -> usize {
    100
}

fn default_existence_recheck_hours() -> u64 {
    24
}

fn default_reconcile_window() -> Option<String> {
    Some("03:30-05:00".to_string())
}

fn default_scheduler_check_interval_secs() -> u64 {
    3600
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            preferred_quality: default_preferred_quality(),
            default_subfolder: None,
            reconcile_time_budget_secs: default_reconcile_time_budget_secs(),
            reconcile_chunk_size: default_reconcile_chunk_size(),
            reconcile_update_batch_size: default_reconcile_update_batch_size(),
            existence_recheck_hours: default_existence_recheck_hours(),
            reconcile_window: default_reconcile_window(),
            scheduler_check_interval_secs: default_scheduler_check_interval_secs(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::config(format!(
            "{}{} must be a non-negative integer, got {:?}",
            ENV_PREFIX, key, value
        ))
    })
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Build from a lookup of unprefixed keys (`DATABASE_URL`, `OUTPUT_DIR`, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("DATABASE_URL").and_then(non_blank) {
            config.database_url = v;
        }
        if let Some(v) = lookup("OUTPUT_DIR").and_then(non_blank) {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOG_DIR").and_then(non_blank) {
            config.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREFERRED_QUALITY").and_then(non_blank) {
            config.preferred_quality = v;
        }
        if let Some(v) = lookup("DEFAULT_SUBFOLDER") {
            config.default_subfolder = non_blank(v);
        }
        if let Some(v) = lookup("RECONCILE_TIME_BUDGET_SECS") {
            config.reconcile_time_budget_secs = parse_number("RECONCILE_TIME_BUDGET_SECS", &v)?;
        }
        if let Some(v) = lookup("RECONCILE_CHUNK_SIZE") {
            config.reconcile_chunk_size = parse_number("RECONCILE_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("RECONCILE_UPDATE_BATCH_SIZE") {
            config.reconcile_update_batch_size = parse_number("RECONCILE_UPDATE_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("EXISTENCE_RECHECK_HOURS") {
            config.existence_recheck_hours = parse_number("EXISTENCE_RECHECK_HOURS", &v)?;
        }
        if let Some(v) = lookup("RECONCILE_WINDOW") {
            config.reconcile_window = non_blank(v);
        }
        if let Some(v) = lookup("SCHEDULER_CHECK_INTERVAL_SECS") {
            config.scheduler_check_interval_secs =
                parse_number("SCHEDULER_CHECK_INTERVAL_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_chunk_size == 0 {
            return Err(Error::config("reconcile_chunk_size must be greater than 0"));
        }
        if self.reconcile_update_batch_size == 0 {
            return Err(Error::config("reconcile_update_batch_size must be greater than 0"));
        }
        if self.scheduler_check_interval_secs == 0 {
            return Err(Error::config("scheduler_check_interval_secs must be greater than 0"));
        }
        Ok(())
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_preferred_quality(mut self, quality: impl Into<String>) -> Self {
        self.preferred_quality = quality.into();
        self
    }

    pub fn with_default_subfolder(mut self, subfolder: Option<String>) -> Self {
        self.default_subfolder = subfolder;
        self
    }

    pub fn with_reconcile_time_budget_secs(mut self, secs: u64) -> Self {
        self.reconcile_time_budget_secs = secs;
        self
    }

    pub fn with_reconcile_window(mut self, window: Option<String>) -> Self {
        self.reconcile_window = window;
        self
    }

    pub fn with_scheduler_check_interval_secs(mut self, secs: u64) -> Self {
        self.scheduler_check_interval_secs = secs;
        self
    }

    pub fn reconcile_time_budget(&self) -> Duration {
        Duration::from_secs(self.reconcile_time_budget_secs)
    }

    pub fn existence_recheck_window(&self) -> Duration {
        Duration::from_secs(self.existence_recheck_hours.saturating_mul(60 * 60))
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            chunk_size: self.reconcile_chunk_size,
            update_batch_size: self.reconcile_update_batch_size,
        }
    }
}

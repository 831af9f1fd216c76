//! Daemon settings
//!
//! Layered with the `config` crate: built-in defaults, then the TOML file at
//! `$RECUR_CONFIG` (default `~/.recur/recur.toml`), then `RECUR__*`
//! environment variables (`RECUR__DAEMON__DATABASE_PATH=/tmp/recur.db`).

use recur_core::domain::SchedulerConfig;
use recur_core::error::{AppError, Result};
use recur_core::port::ConfigProvider;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "~/.recur/recur.toml";
const ENV_PREFIX: &str = "RECUR";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSettings {
    /// SQLite file for job history and locks (`~` expanded)
    pub database_path: String,

    /// JSON job file read by the "file" task provider (`~` expanded)
    pub jobs_file: String,

    /// `pretty` or `json`; `RECUR_LOG_FORMAT` wins
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory for daily rolling log files, in addition to stdout
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Variables command tasks inherit from the daemon
    pub env_allowlist: Vec<String>,

    /// Age after which a SQLite job lock counts as abandoned
    pub lock_ttl_secs: u64,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl DaemonSettings {
    pub fn database_path(&self) -> String {
        expand(&self.database_path)
    }

    pub fn jobs_file(&self) -> String {
        expand(&self.jobs_file)
    }

    pub fn log_dir(&self) -> Option<String> {
        self.log_dir.as_deref().map(expand)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

impl Settings {
    /// Load from an explicit settings file; a missing file is not an error
    pub fn load_from(path: &str) -> std::result::Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(path).required(false))
            // Override with environment variables (RECUR__SECTION__KEY)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

pub fn config_path() -> String {
    std::env::var("RECUR_CONFIG").unwrap_or_else(|_| expand(DEFAULT_CONFIG_PATH))
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

/// Scheduler section of the settings file, re-read on every manager
/// initialize so a reload picks up edits
pub struct SettingsConfigProvider {
    path: String,
}

impl SettingsConfigProvider {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for SettingsConfigProvider {
    fn load(&self) -> Result<SchedulerConfig> {
        Settings::load_from(&self.path)
            .map(|settings| settings.scheduler)
            .map_err(|e| AppError::Config(format!("{}: {}", self.path, e)))
    }
}

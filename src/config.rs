//! Application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::RecorderError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Occupancy feed endpoint, returns a JSON array of location states
    pub url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Minimum time between two stored full-payload snapshots
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub snapshot_interval: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("api.url", "")?
            .set_default("api.timeout", 30)?
            .set_default("database.path", "occupancy.db")?
            .set_default("database.snapshot_interval", 3600)?
            .set_default("scheduler.interval", 900)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("OCCUPANCY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.url.trim().is_empty() {
            return Err(RecorderError::ConfigurationError {
                message: "API url must be set (OCCUPANCY__API__URL)".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "API timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), RecorderError> {
        self.validate_path()?;
        self.validate_snapshot_interval()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                self.ensure_directory_exists(parent)?;
            }
        }
        Ok(())
    }

    fn validate_path(&self) -> Result<(), RecorderError> {
        if self.path.as_os_str().is_empty() {
            return Err(RecorderError::ConfigurationError {
                message: "Database path cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn validate_snapshot_interval(&self) -> Result<(), RecorderError> {
        if self.snapshot_interval.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "Snapshot interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), RecorderError> {
        if !dir.exists() {
            warn!("Database directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| RecorderError::ConfigurationError {
                message: format!("Could not create database directory: {}", e),
            })?;
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.interval.is_zero() {
            return Err(RecorderError::ConfigurationError {
                message: "Scheduler interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

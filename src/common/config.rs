//! Configuration for minidoc components

use crate::common::schema::SchemaMap;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the optional config file (`minidoc.toml`, `minidoc.json`, ...)
pub const CONFIG_FILE: &str = "minidoc";

/// Prefix of environment overrides, e.g. `MINIDOC_COORDINATOR__TOTAL_RANK=4`
pub const ENV_PREFIX: &str = "MINIDOC";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator-specific config
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an explicit file (required) or `minidoc.toml` in the
    /// current directory (optional), then apply `MINIDOC_*` environment
    /// overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(CONFIG_FILE).required(false),
        };
        let config: Config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.coordinator.validate()?;
        Ok(config)
    }

    /// Same as [`Config::load_from`], but falls back to defaults. The error,
    /// if any, is handed back so the caller can report it once logging is
    /// set up.
    pub fn load_or_default(path: Option<&Path>) -> (Self, Option<Error>) {
        match Self::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Number of data partitions, ranks `0..total_rank`
    #[serde(default = "default_total_rank")]
    pub total_rank: usize,

    /// Directory holding one socket per partition rank
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory holding the coordinator's schema catalog
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Per-call deadline for remote calls; 0 waits forever
    #[serde(default)]
    pub call_timeout_ms: u64,

    /// Collections and indexes to create when bootstrapping a fresh cluster
    #[serde(default)]
    pub initial_schema: SchemaMap,
}

fn default_total_rank() -> usize {
    1
}
fn default_work_dir() -> PathBuf {
    PathBuf::from("./minidoc-run")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./minidoc-data")
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            total_rank: default_total_rank(),
            work_dir: default_work_dir(),
            data_dir: default_data_dir(),
            call_timeout_ms: 0,
            initial_schema: SchemaMap::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(
        total_rank: usize,
        work_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            total_rank,
            work_dir: work_dir.into(),
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_rank == 0 {
            return Err(Error::InvalidConfig(
                "total_rank must be at least 1".into(),
            ));
        }
        crate::common::schema::validate_schema(&self.initial_schema)?;
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        match self.call_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

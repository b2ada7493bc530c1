//! Runtime configuration for hosts embedding the core.
//!
//! # Responsibility
//! - Describe database and logging settings with usable defaults.
//! - Load them from an optional TOML file, then apply `TASKBOARD_*`
//!   environment overrides.
//!
//! # Invariants
//! - Every field has a default; an empty file is a valid configuration.
//! - Environment overrides always win over file values.
//!
//! ```toml
//! [database]
//! path = "/var/lib/taskboard/board.db"
//! busy_timeout_ms = 5000
//! write_mode = "atomic"
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/taskboard"
//! ```

use crate::logging;
use crate::repo::ticket_repo::WriteMode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "TASKBOARD_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "TASKBOARD_BUSY_TIMEOUT_MS";
pub const ENV_WRITE_MODE: &str = "TASKBOARD_WRITE_MODE";
pub const ENV_LOG_LEVEL: &str = "TASKBOARD_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKBOARD_LOG_DIR";

const DEFAULT_DB_PATH: &str = "taskboard.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SQLite settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a writer waits for the database lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `sequential` runs the store without multi-row atomicity.
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            write_mode: WriteMode::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// File logging settings. Logging stays off while `dir` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_level() -> String {
    logging::default_level().to_string()
}

/// Errors while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config text is not valid TOML for [`CoreConfig`].
    Parse {
        path: Option<PathBuf>,
        source: toml::de::Error,
    },
    /// Environment override has an unusable value.
    InvalidEnv { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "invalid config `{}`: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "invalid config: {source}"),
            Self::InvalidEnv { key, value } => {
                write!(f, "invalid value `{value}` for {key}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidEnv { .. } => None,
        }
    }
}

impl CoreConfig {
    /// Parses configuration text without touching the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Loads `path` when given, then applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: Some(path.to_path_buf()),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_DB_PATH) {
            self.database.path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.database.busy_timeout_ms =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_BUSY_TIMEOUT_MS,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_WRITE_MODE) {
            self.database.write_mode = match value.trim().to_ascii_lowercase().as_str() {
                "atomic" => WriteMode::Atomic,
                "sequential" => WriteMode::Sequential,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: ENV_WRITE_MODE,
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        if let Some(value) = lookup(ENV_LOG_DIR) {
            self.logging.dir = Some(PathBuf::from(value));
        }
        Ok(())
    }
}

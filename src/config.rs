//! TOML configuration for the driver and the writer runtime.

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration file.
///
/// ```toml
/// [driver]
/// path = "app.db"
/// busy_timeout_ms = 2000
///
/// [runtime]
/// default_timeout_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite connection settings.
    pub driver: DriverConfig,
    /// Writer task settings.
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Parses a TOML document; missing sections take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| Error::config(format!("invalid config: {err}")))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| Error::config(format!("reading {}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Database file; in memory when absent.
    pub path: Option<PathBuf>,
    /// `journal_mode` pragma, e.g. `WAL`.
    pub journal_mode: String,
    /// `synchronous` pragma, e.g. `NORMAL`.
    pub synchronous: String,
    /// Enforce foreign keys; edges rely on it.
    pub foreign_keys: bool,
    /// How long a locked database is retried before failing.
    pub busy_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            foreign_keys: true,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Writer runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bound of the command queue in front of the writer task.
    pub queue_bound: usize,
    /// Capacity of the committed-mutation broadcast channel.
    pub event_capacity: usize,
    /// Deadline given to each command's context; zero disables it.
    pub default_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_bound: 256,
            event_capacity: 1024,
            default_timeout_ms: 0,
        }
    }
}

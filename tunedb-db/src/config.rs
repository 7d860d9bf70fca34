//! Library settings read from a TOML file.
//!
//! Every key is optional:
//!
//! ```toml
//! path = "~/Music/library.db"
//! timeout = 5.0
//! time_format = "%Y-%m-%d %H:%M:%S"
//! format_raw_length = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tunedb_types::{DateType, DurationType, DEFAULT_TIME_FORMAT};

use crate::database::MAX_TIMEOUT;
use crate::error::Result;

/// Default database location: `<data dir>/tunedb/library.db`.
pub fn default_library_path() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data.join("tunedb").join("library.db")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in seconds.
    pub timeout: f64,
    /// strftime pattern used by date fields.
    pub time_format: String,
    /// Display durations as raw seconds instead of `M:SS`.
    pub format_raw_length: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_library_path(),
            timeout: 5.0,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            format_raw_length: false,
        }
    }
}

impl DbConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read settings from `path`. A leading `~` in the configured database
    /// path is expanded.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Ok(rest) = config.path.strip_prefix("~") {
            if let Some(home) = dirs::home_dir() {
                config.path = home.join(rest);
            }
        }
        Ok(config)
    }

    /// The busy timeout; negative or NaN values count as zero and huge
    /// ones are capped at [`MAX_TIMEOUT`].
    pub fn timeout_duration(&self) -> Duration {
        if self.timeout > 0.0 {
            Duration::try_from_secs_f64(self.timeout).map_or(MAX_TIMEOUT, |d| d.min(MAX_TIMEOUT))
        } else {
            Duration::ZERO
        }
    }

    pub fn date_type(&self) -> DateType {
        DateType::new(self.time_format.clone())
    }

    pub fn duration_type(&self) -> DurationType {
        DurationType::new(self.format_raw_length)
    }
}

//! Configuration management for Keyboard Timing
//!
//! Settings are read from a platform-specific config file when it exists;
//! every field has a default so a missing or partial file is fine.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/keyboard-timing/config.toml` |
//! | macOS | `~/Library/Application Support/keyboard-timing/config.toml` |
//! | Windows | `%APPDATA%\keyboard-timing\config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use keyboard_timing::Config;
//!
//! let mut config = Config::load().unwrap_or_default();
//! config.capture.poll_interval_ms = 2;
//! config.save().expect("Failed to save config");
//! ```

use crate::backend::BackendKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to determine config directory
    NoConfigDir,
    /// IO error reading or writing config file
    Io(io::Error),
    /// Failed to parse config file
    Parse(toml::de::Error),
    /// Failed to serialize config
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "Could not determine config directory"),
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e)
    }
}

/// Returns the path to the config file. Does not create anything.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join("keyboard-timing").join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Capture backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Backend used when none is given on the command line
    pub backend: BackendKind,
    /// Upper bound on how long one pump iteration waits, in milliseconds
    pub poll_interval_ms: u64,
    /// Key that ends a window-mode session
    pub stop_key: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Window,
            poll_interval_ms: 5,
            stop_key: "escape".to_string(),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for default log paths
    pub directory: PathBuf,
    /// Echo each record as it is captured
    pub live_display: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            live_display: true,
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file, creating its directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Pump wait bound as Duration, never below 1 ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture.poll_interval_ms.max(1))
    }

    /// Log path for `backend` when no path was given
    pub fn default_output(&self, backend: BackendKind) -> PathBuf {
        backend.default_output(&self.output.directory)
    }
}

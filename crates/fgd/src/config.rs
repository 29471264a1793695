//! Daemon configuration.
//!
//! Read from `config.toml` under the platform config directory. Every field
//! is optional; an absent file yields the defaults.
//!
//! ```toml
//! poll_interval_ms = 3000
//! focus_debounce_ms = 1000
//! socket_path = "/tmp/focusguard.sock"
//! home_package = "focusguard"
//!
//! [display_names]
//! "org.mozilla.firefox" = "Firefox"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default control socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/focusguard.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "FG_SOCKET";

const APP_DIR: &str = "focusguard";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Usage-log poll interval.
    pub poll_interval_ms: u64,

    /// Minimum spacing between processed focus notifications.
    pub focus_debounce_ms: u64,

    /// Periodic limit re-evaluation; defaults to the poll interval.
    pub limit_check_interval_ms: Option<u64>,

    /// Control socket path.
    pub socket_path: PathBuf,

    /// PID file, log file, status file and session log.
    pub state_dir: PathBuf,

    /// TOML list of per-app limits.
    pub limits_path: PathBuf,

    /// Command printing the foreground application identifier.
    pub foreground_command: Vec<String>,

    /// Command run with the package appended to raise a window.
    pub focus_command: Option<Vec<String>>,

    /// Package raised on intervention.
    pub home_package: String,

    /// Package identifier to human-readable name.
    pub display_names: HashMap<String, String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            focus_debounce_ms: 1_000,
            limit_check_interval_ms: None,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            state_dir: default_state_dir(),
            limits_path: default_config_dir().join("limits.toml"),
            foreground_command: vec![
                "xdotool".to_string(),
                "getactivewindow".to_string(),
                "getwindowclassname".to_string(),
            ],
            focus_command: None,
            home_package: APP_DIR.to_string(),
            display_names: HashMap::new(),
        }
    }
}

impl DaemonConfig {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// explicit file is an error. `FG_SOCKET` overrides the socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(socket) = std::env::var(SOCKET_ENV) {
            if !socket.is_empty() {
                config.socket_path = PathBuf::from(socket);
            }
        }
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation("poll_interval_ms must be > 0".to_string()));
        }
        if self.limit_check_interval_ms == Some(0) {
            return Err(ConfigError::Validation(
                "limit_check_interval_ms must be > 0".to_string(),
            ));
        }
        if self.foreground_command.is_empty() {
            return Err(ConfigError::Validation("foreground_command must not be empty".to_string()));
        }
        if self.focus_command.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::Validation("focus_command must not be empty".to_string()));
        }
        if self.home_package.trim().is_empty() {
            return Err(ConfigError::Validation("home_package must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn focus_debounce(&self) -> Duration {
        Duration::from_millis(self.focus_debounce_ms)
    }

    pub fn limit_check_interval(&self) -> Duration {
        Duration::from_millis(self.limit_check_interval_ms.unwrap_or(self.poll_interval_ms))
    }

    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join("fgd.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join("fgd.log")
    }

    /// Keep-alive status file.
    pub fn status_file(&self) -> PathBuf {
        self.state_dir.join("tracking.json")
    }

    pub fn sessions_file(&self) -> PathBuf {
        self.state_dir.join("sessions.jsonl")
    }
}

/// `~/.config/focusguard` on Linux.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}

/// `~/.local/state/focusguard` on Linux.
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

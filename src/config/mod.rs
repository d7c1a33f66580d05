//! Configuration loading
//!
//! Reads an optional JSON5 file, then applies `CLASSPOLL_*` environment
//! overrides, then validates.
//!
//! Path resolution order: explicit path (CLI `--config`), then
//! `CLASSPOLL_CONFIG_PATH`, then `classpoll.json5` in the working directory.

pub mod types;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use types::{Config, LogFormat, LoggingConfig, PollConfig, ServerConfig};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CLASSPOLL_CONFIG_PATH";
/// File looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "classpoll.json5";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Resolve which config file to read.
pub fn get_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load, apply environment overrides and validate.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = get_config_path(explicit);
    let mut config = load_config_file(&path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Parse a config file. A missing file yields defaults.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse JSON5 text. Blank input yields defaults.
pub fn parse_config(raw: &str) -> Result<Config, String> {
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    json5::from_str(raw).map_err(|err| err.to_string())
}

impl Config {
    /// Apply `CLASSPOLL_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("CLASSPOLL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CLASSPOLL_PORT") {
            self.server.port = parse_env("CLASSPOLL_PORT", &port)?;
        }
        if let Some(secs) = lookup("CLASSPOLL_POLL_TIMEOUT_SECS") {
            self.poll.timeout_seconds = parse_env("CLASSPOLL_POLL_TIMEOUT_SECS", &secs)?;
        }
        if let Some(level) = lookup("CLASSPOLL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CLASSPOLL_LOG_FORMAT") {
            self.logging.format = parse_env("CLASSPOLL_LOG_FORMAT", &format)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "poll.timeoutSeconds".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.poll.min_options < crate::polls::MIN_OPTIONS {
            return Err(ConfigError::Invalid {
                key: "poll.minOptions".to_string(),
                message: format!("must be at least {}", crate::polls::MIN_OPTIONS),
            });
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "server.host".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
        key: key.to_string(),
        message: err.to_string(),
    })
}

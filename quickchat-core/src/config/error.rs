//! Errors raised while loading, checking or saving a client config

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not TOML, or a field has the wrong type
    #[error("Malformed config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `QUICKCHAT_*` override could not be parsed
    #[error("{key}={value:?} is not a valid {expected}: {reason}")]
    InvalidEnv {
        key: String,
        value: String,
        expected: &'static str,
        reason: String,
    },

    /// Parsed fine, but a value is out of range
    #[error("Invalid configuration: {0}")]
    ValidationFailed(String),
}

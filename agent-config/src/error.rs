//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the schema.
    #[error("failed to parse config {origin}: {source}")]
    Parse {
        /// File path or other origin label.
        origin: String,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range or cannot be parsed.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Config key or environment variable.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Convenience constructor for [`ConfigError::InvalidValue`].
    #[must_use]
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

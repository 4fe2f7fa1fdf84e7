//! Error types for sprintsync-core.

use thiserror::Error;

/// Errors raised while assembling a [`crate::Config`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting with no default was unset or empty.
    #[error("missing required env var: {key}")]
    MissingRequired { key: &'static str },

    /// A setting was present but could not be interpreted.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

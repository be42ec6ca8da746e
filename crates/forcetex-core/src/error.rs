//! Error types for configuration and input loading.

use thiserror::Error;

/// Errors raised while loading or validating configuration and graph input.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The simulation space must be a power of two so the pyramid halves evenly.
    #[error("space size must be a power of two >= 2, got {0}")]
    SpaceSize(u32),

    /// A coefficient is outside the range the integrator accepts.
    #[error("invalid value for `{name}`: {reason}")]
    OutOfRange {
        name: &'static str,
        reason: String,
    },

    /// Malformed JSON.
    #[error("failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Reading a file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn out_of_range(name: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            name,
            reason: reason.into(),
        }
    }
}

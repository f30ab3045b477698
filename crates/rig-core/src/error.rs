//! Core error types.

use thiserror::Error;

/// Errors raised while building configuration or selectors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("conflicting selection: {0}")]
    ConflictingSelection(String),
}

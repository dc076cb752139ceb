//! Error types and result aliases for restyle.
//!
//! This module defines the error handling infrastructure:
//! - [`Result<T>`]: Type alias for `anyhow::Result<T>` used by the config, CLI and binary layers
//! - [`FormatError`]: Typed failures of the formatting core, so callers can tell a
//!   failing step apart from an I/O problem or a diverging file

use std::path::PathBuf;

use anyhow::Result as AnyhowResult;
use thiserror::Error;

pub type Result<T> = AnyhowResult<T>;

/// Failure raised while reading, formatting or writing a single file
#[derive(Debug, Error)]
pub enum FormatError {
    /// A formatter step rejected its input
    #[error("Step '{step}' found problem in '{}': {source}", file.display())]
    Step {
        step: String,
        file: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error on '{}': {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid in the configured encoding
    #[error("'{}' is not valid {encoding}", file.display())]
    Decode { file: PathBuf, encoding: String },

    /// Text cannot be represented in the configured encoding
    #[error("cannot encode '{}' as {encoding}", file.display())]
    Encode { file: PathBuf, encoding: String },

    /// Canonical value requested for a file whose formatting never settles
    #[error("formatting '{}' diverges, there is no canonical result", file.display())]
    Diverged { file: PathBuf },

    /// A step could not be constructed from its configuration
    #[error("invalid step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },
}

impl FormatError {
    pub(crate) fn io(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FormatError::Io {
            file: file.into(),
            source,
        }
    }

    /// Name of the failing step, if this is a step failure
    #[must_use]
    pub fn step_name(&self) -> Option<&str> {
        match self {
            FormatError::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

//! Formatter steps: named, versioned text transforms.
//!
//! A step maps `(unix text, file path)` to new unix text, or to `None` when it
//! has nothing to change. Steps are built once from configuration and shared
//! across every file (and every rayon worker), so they must not keep per-call
//! mutable state.
//!
//! - [`FormatterStep`]: the capability every step implements
//! - [`StepFingerprint`]: configuration identity used to decide whether two
//!   steps would format identically
//! - [`FnStep`]: a step backed by a closure
//! - [`generic`]: small built-in steps addressable from `restyle.toml`

pub mod generic;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use generic::{EndWithNewline, Replace, ReplaceRegex, TrimTrailingWhitespace};

/// Configuration identity of a step: `(name, version, serialized parameters)`.
///
/// `params` holds the compact JSON text of [`FormatterStep::params`]. JSON
/// object keys are emitted in sorted order, so the fingerprint of an unchanged
/// configuration is identical across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepFingerprint {
    pub name: String,
    pub version: u32,
    pub params: String,
}

/// A single text rewrite applied by a [`Formatter`](crate::Formatter)
pub trait FormatterStep: Send + Sync {
    /// Human readable name, used in error messages and error policies
    fn name(&self) -> &str;

    /// Behavior version. Bump it whenever the output for a given input changes.
    fn version(&self) -> u32 {
        1
    }

    /// Parameters that influence the output
    fn params(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Format `input` (unix newlines) belonging to `file`.
    ///
    /// Returns `Ok(None)` when the input needs no change.
    fn format(&self, input: &str, file: &Path) -> anyhow::Result<Option<String>>;

    /// Release step-scoped resources. Called once when the owning formatter is dropped.
    fn close(&self) {}

    fn fingerprint(&self) -> StepFingerprint {
        StepFingerprint {
            name: self.name().to_string(),
            version: self.version(),
            params: self.params().to_string(),
        }
    }
}

impl fmt::Debug for dyn FormatterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterStep")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

type StepFn = dyn Fn(&str, &Path) -> anyhow::Result<Option<String>> + Send + Sync;

/// Step backed by a closure.
///
/// A closure cannot be inspected, so its fingerprint only changes when the
/// caller bumps [`FnStep::with_version`].
pub struct FnStep {
    name: String,
    version: u32,
    func: Box<StepFn>,
}

impl FnStep {
    /// Infallible, path-independent step
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::with_file(name, move |input, _| Ok(Some(func(input))))
    }

    /// Step that sees the file path and may fail or report "unchanged"
    pub fn with_file<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str, &Path) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        FnStep {
            name: name.into(),
            version: 1,
            func: Box::new(func),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl FormatterStep for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn format(&self, input: &str, file: &Path) -> anyhow::Result<Option<String>> {
        (self.func)(input, file)
    }
}

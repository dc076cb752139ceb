//! The formatting pipeline.
//!
//! A [`Formatter`] owns an ordered list of [`FormatterStep`]s and the boundary
//! policy (encoding and line endings) for the files it touches:
//!
//! ```text
//! raw bytes --decode--> text --to_unix--> step 1 --> step 2 --> ... --> unix result
//!                                                                          |
//! raw bytes <--encode-- text <--------- line ending policy ----------------+
//! ```
//!
//! Every step sees the previous step's output, normalized to unix newlines.
//! A failing step aborts the pipeline for that file unless the
//! [`ErrorPolicy`] exempts the step or the file.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::encoding::Encoding;
use crate::error::FormatError;
use crate::line_ending::{to_unix, LineEnding};
use crate::step::{FormatterStep, StepFingerprint};

/// Which step failures are downgraded to warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    ignored_steps: Vec<String>,
    ignored_paths: Vec<String>,
}

impl ErrorPolicy {
    /// Every failure aborts the file
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ignore_error_for_step(mut self, step: impl Into<String>) -> Self {
        self.ignored_steps.push(step.into());
        self
    }

    /// `path` is matched against the file path relative to the root directory
    #[must_use]
    pub fn ignore_error_for_path(mut self, path: impl Into<String>) -> Self {
        self.ignored_paths.push(path.into());
        self
    }

    fn ignores(&self, step: &str, relative: &Path) -> bool {
        self.ignored_steps.iter().any(|s| s == step)
            || self
                .ignored_paths
                .iter()
                .any(|p| Path::new(p) == relative)
    }
}

/// Builder for [`Formatter`]
#[derive(Default)]
pub struct FormatterBuilder {
    steps: Vec<Box<dyn FormatterStep>>,
    line_endings: LineEnding,
    encoding: Encoding,
    root_dir: Option<PathBuf>,
    error_policy: ErrorPolicy,
}

impl FormatterBuilder {
    #[must_use]
    pub fn step(mut self, step: impl FormatterStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: impl IntoIterator<Item = Box<dyn FormatterStep>>) -> Self {
        self.steps.extend(steps);
        self
    }

    #[must_use]
    pub fn line_endings(mut self, line_endings: LineEnding) -> Self {
        self.line_endings = line_endings;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Directory that diagnostics and path-based error exemptions are relative to
    #[must_use]
    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }

    #[must_use]
    pub fn error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    #[must_use]
    pub fn build(self) -> Formatter {
        Formatter {
            steps: self.steps,
            line_endings: self.line_endings,
            encoding: self.encoding,
            root_dir: self
                .root_dir
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
            error_policy: self.error_policy,
        }
    }
}

/// An immutable, ordered pipeline of steps plus its boundary policy.
///
/// `Formatter` is `Sync`: one instance can serve many files from many threads.
/// Dropping it closes every step.
pub struct Formatter {
    steps: Vec<Box<dyn FormatterStep>>,
    line_endings: LineEnding,
    encoding: Encoding,
    root_dir: PathBuf,
    error_policy: ErrorPolicy,
}

impl Formatter {
    #[must_use]
    pub fn builder() -> FormatterBuilder {
        FormatterBuilder::default()
    }

    #[must_use]
    pub fn steps(&self) -> &[Box<dyn FormatterStep>] {
        &self.steps
    }

    /// Fingerprints of all steps, in pipeline order
    #[must_use]
    pub fn fingerprints(&self) -> Vec<StepFingerprint> {
        self.steps.iter().map(|s| s.fingerprint()).collect()
    }

    #[must_use]
    pub fn line_endings(&self) -> LineEnding {
        self.line_endings
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// `file` relative to the root directory, or just its file name when it lies outside
    #[must_use]
    pub fn relativize(&self, file: &Path) -> PathBuf {
        match file.strip_prefix(&self.root_dir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) if file.is_relative() => file.to_path_buf(),
            Err(_) => file
                .file_name()
                .map_or_else(|| file.to_path_buf(), PathBuf::from),
        }
    }

    /// Decoded content of `file`, line endings untouched
    pub fn read_raw(&self, file: &Path) -> Result<String, FormatError> {
        let bytes = std::fs::read(file).map_err(|e| FormatError::io(file, e))?;
        self.encoding.decode(&bytes, file)
    }

    /// Decoded content of `file` with unix line endings
    pub fn read(&self, file: &Path) -> Result<String, FormatError> {
        Ok(to_unix(&self.read_raw(file)?))
    }

    /// Run every step over `unix`, in order.
    ///
    /// A step returning `None` leaves the text as is. The first failing step
    /// aborts the computation unless the error policy exempts it.
    pub fn compute(&self, unix: &str, file: &Path) -> Result<String, FormatError> {
        let mut current = unix.to_string();
        for step in &self.steps {
            match step.format(&current, file) {
                Ok(Some(formatted)) => current = to_unix(&formatted),
                Ok(None) => {}
                Err(source) => {
                    let relative = self.relativize(file);
                    if self.error_policy.ignores(step.name(), &relative) {
                        warn!(
                            "Unable to apply step '{}' to '{}': {source:#}",
                            step.name(),
                            relative.display()
                        );
                        continue;
                    }
                    return Err(FormatError::Step {
                        step: step.name().to_string(),
                        file: file.to_path_buf(),
                        source,
                    });
                }
            }
        }
        Ok(current)
    }

    /// Convert a unix result to the line endings `file` should have, given its `original` content
    #[must_use]
    pub fn compute_line_endings(&self, unix: &str, original: &str) -> String {
        self.line_endings.apply(unix, original)
    }

    /// Formatted unix text of `raw`, or `None` when `raw` is already formatted
    /// (including its line endings)
    pub fn format_text_if_dirty(&self, raw: &str, file: &Path) -> Result<Option<String>, FormatError> {
        let formatted = self.compute(&to_unix(raw), file)?;
        if self.compute_line_endings(&formatted, raw) == raw {
            Ok(None)
        } else {
            Ok(Some(formatted))
        }
    }

    /// Formatted unix content of `file`, or `None` when the file is already clean
    pub fn format_if_dirty(&self, file: &Path) -> Result<Option<String>, FormatError> {
        debug!("Applying format to {}", file.display());
        let raw = self.read_raw(file)?;
        self.format_text_if_dirty(&raw, file)
    }

    pub fn is_clean(&self, file: &Path) -> Result<bool, FormatError> {
        Ok(self.format_if_dirty(file)?.is_none())
    }

    /// Write `unix` to `file` with the policy's line endings (derived from `original`)
    pub fn write(&self, file: &Path, unix: &str, original: &str) -> Result<(), FormatError> {
        let text = self.compute_line_endings(unix, original);
        let bytes = self.encoding.encode(&text, file)?;
        std::fs::write(file, bytes).map_err(|e| FormatError::io(file, e))
    }

    /// Format `file` in place. Returns the unix result when the file was rewritten.
    pub fn apply_if_dirty(&self, file: &Path) -> Result<Option<String>, FormatError> {
        let raw = self.read_raw(file)?;
        let Some(formatted) = self.format_text_if_dirty(&raw, file)? else {
            return Ok(None);
        };
        self.write(file, &formatted, &raw)?;
        Ok(Some(formatted))
    }

    /// Format `file` in place, returning whether it changed
    pub fn apply(&self, file: &Path) -> Result<bool, FormatError> {
        Ok(self.apply_if_dirty(file)?.is_some())
    }

    /// Release step resources now rather than at the end of scope
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Formatter {
    fn drop(&mut self) {
        for step in &self.steps {
            step.close();
        }
    }
}

impl std::fmt::Debug for Formatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatter")
            .field("steps", &self.steps)
            .field("line_endings", &self.line_endings)
            .field("encoding", &self.encoding)
            .field("root_dir", &self.root_dir)
            .finish_non_exhaustive()
    }
}

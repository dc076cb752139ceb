//! Padded cell: diagnosing pipelines that are not idempotent.
//!
//! A misbehaving step (one where `f(f(x)) != f(x)`) makes a check fail even
//! right after formatting was applied, which is confusing. A [`PaddedCell`]
//! records the states the pipeline goes through for one file so the user can
//! see what the step is doing, and offers a canonical value to settle on when
//! the states converge or cycle.
//!
//! Unlike [`ConvergenceAnalyzer`](super::ConvergenceAnalyzer), a clean file is
//! reported as a one-state convergence instead of a separate outcome.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use tracing::debug;

use super::canonical::canonical;
use crate::error::FormatError;
use crate::formatter::Formatter;

/// Time spent looking for a misbehaving file before [`PaddedCell::any_misbehave`] gives up
pub const MAX_DETERMINE_PADDING: Duration = Duration::from_millis(500);

/// How the states of a padded cell ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaddedCellKind {
    Converge,
    Cycle,
    Diverge,
}

impl fmt::Display for PaddedCellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaddedCellKind::Converge => f.write_str("converge"),
            PaddedCellKind::Cycle => f.write_str("cycle"),
            PaddedCellKind::Diverge => f.write_str("diverge"),
        }
    }
}

/// Result of chasing the pipeline's states for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedCell {
    file: PathBuf,
    kind: PaddedCellKind,
    steps: Vec<String>,
}

impl PaddedCell {
    /// Default bound on the number of recorded states
    pub const MAX_CYCLE: usize = 10;

    #[must_use]
    pub fn new(kind: PaddedCellKind, file: impl Into<PathBuf>, steps: Vec<String>) -> Self {
        PaddedCell {
            file: file.into(),
            kind,
            steps,
        }
    }

    /// Chase the states starting from the current content of `file`
    pub fn check(formatter: &Formatter, file: &Path) -> Result<Self, FormatError> {
        let original = formatter.read(file)?;
        Self::check_content(formatter, file, &original)
    }

    /// Chase the states starting from `original_unix`, treated as the content of `file`
    pub fn check_content(
        formatter: &Formatter,
        file: &Path,
        original_unix: &str,
    ) -> Result<Self, FormatError> {
        Self::check_with_limit(formatter, file, original_unix, Self::MAX_CYCLE)
    }

    /// Like [`check_content`](Self::check_content), recording at most `max_len` states
    pub fn check_with_limit(
        formatter: &Formatter,
        file: &Path,
        original_unix: &str,
        max_len: usize,
    ) -> Result<Self, FormatError> {
        let applied_once = formatter.compute(original_unix, file)?;
        if applied_once == original_unix {
            return Ok(Self::new(PaddedCellKind::Converge, file, vec![applied_once]));
        }
        let applied_twice = formatter.compute(&applied_once, file)?;
        if applied_twice == applied_once {
            return Ok(Self::new(PaddedCellKind::Converge, file, vec![applied_once]));
        }

        let mut applied = IndexSet::new();
        applied.insert(applied_once);
        applied.insert(applied_twice.clone());
        let mut input = applied_twice;
        while applied.len() < max_len {
            let output = formatter.compute(&input, file)?;
            if output == input {
                return Ok(Self::new(
                    PaddedCellKind::Converge,
                    file,
                    applied.into_iter().collect(),
                ));
            }
            if let Some(idx) = applied.get_index_of(&output) {
                return Ok(Self::new(
                    PaddedCellKind::Cycle,
                    file,
                    applied.into_iter().skip(idx).collect(),
                ));
            }
            applied.insert(output.clone());
            input = output;
        }
        Ok(Self::new(
            PaddedCellKind::Diverge,
            file,
            applied.into_iter().collect(),
        ))
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn kind(&self) -> PaddedCellKind {
        self.kind
    }

    /// Recorded states, in the order they were produced
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// False only when the first application already was a fixed point
    #[must_use]
    pub fn misbehaved(&self) -> bool {
        !(self.kind == PaddedCellKind::Converge && self.steps.len() == 1)
    }

    /// True when there is a canonical value to settle on
    #[must_use]
    pub fn is_resolvable(&self) -> bool {
        self.kind != PaddedCellKind::Diverge
    }

    /// The fixed point of a convergence, or the shortest-then-smallest state of a cycle
    pub fn canonical(&self) -> Result<&str, FormatError> {
        let value = match self.kind {
            PaddedCellKind::Converge => self.steps.last().map(String::as_str),
            PaddedCellKind::Cycle => canonical(&self.steps),
            PaddedCellKind::Diverge => None,
        };
        value.ok_or_else(|| FormatError::Diverged {
            file: self.file.clone(),
        })
    }

    /// One-line description of what the pipeline does with this file
    #[must_use]
    pub fn user_message(&self) -> String {
        let n = self.steps.len();
        match self.kind {
            PaddedCellKind::Converge => format!("converges after {n} steps"),
            PaddedCellKind::Cycle => format!("cycles between {n} steps"),
            PaddedCellKind::Diverge => format!("diverges after {n} steps"),
        }
    }

    /// Whether any of `files` misbehaves under `formatter`.
    ///
    /// Stops at the first misbehaving file, and answers `false` once
    /// [`MAX_DETERMINE_PADDING`] has been spent without finding one.
    pub fn any_misbehave(formatter: &Formatter, files: &[PathBuf]) -> Result<bool, FormatError> {
        Ok(Self::first_misbehaving(formatter, files, MAX_DETERMINE_PADDING)?.is_some())
    }

    /// The first misbehaving cell among `files`, searched for at most `budget`
    pub fn first_misbehaving(
        formatter: &Formatter,
        files: &[PathBuf],
        budget: Duration,
    ) -> Result<Option<Self>, FormatError> {
        let start = Instant::now();
        for file in files {
            let cell = Self::check(formatter, file)?;
            if cell.misbehaved() {
                debug!("{} {}", file.display(), cell.user_message());
                return Ok(Some(cell));
            }
            if start.elapsed() > budget {
                debug!("No misbehaving file found within {budget:?}");
                return Ok(None);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::step::FnStep;

    fn formatter<F>(func: F) -> Formatter
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Formatter::builder().step(FnStep::new("step", func)).build()
    }

    fn cell<F>(input: &str, func: F) -> PaddedCell
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        PaddedCell::check_content(&formatter(func), Path::new("input.txt"), input).unwrap()
    }

    #[test]
    fn test_identity_is_well_behaved() {
        let cell = cell("CCC", str::to_string);
        assert!(!cell.misbehaved());
        assert_eq!(cell.kind(), PaddedCellKind::Converge);
        assert_eq!(cell.steps(), ["CCC"]);
        assert_eq!(cell.canonical().unwrap(), "CCC");
    }

    #[test]
    fn test_constant_is_well_behaved() {
        let cell = cell("CCC", |_| "A".to_string());
        assert!(!cell.misbehaved());
        assert_eq!(cell.steps(), ["A"]);
        assert_eq!(cell.canonical().unwrap(), "A");
    }

    #[test]
    fn test_four_state_cycle() {
        let cell = cell("CCC", |s| {
            let next = match s {
                "A" => "B",
                "B" => "C",
                "C" => "D",
                _ => "A",
            };
            next.to_string()
        });
        assert!(cell.misbehaved());
        assert_eq!(cell.kind(), PaddedCellKind::Cycle);
        assert_eq!(cell.steps(), ["A", "B", "C", "D"]);
        assert_eq!(cell.canonical().unwrap(), "A");
        assert_eq!(cell.user_message(), "cycles between 4 steps");
    }

    #[test]
    fn test_converging_records_every_state() {
        let cell = cell("CCC", |s| {
            let mut out = s.to_string();
            out.pop();
            out
        });
        assert!(cell.misbehaved());
        assert_eq!(cell.kind(), PaddedCellKind::Converge);
        assert_eq!(cell.steps(), ["CC", "C", ""]);
        assert_eq!(cell.canonical().unwrap(), "");
        assert_eq!(cell.user_message(), "converges after 3 steps");
    }

    #[test]
    fn test_diverging_has_no_canonical() {
        let cell = cell("", |s| format!("{s} "));
        assert!(cell.misbehaved());
        assert_eq!(cell.kind(), PaddedCellKind::Diverge);
        let expected: Vec<String> = (1..=PaddedCell::MAX_CYCLE).map(|n| " ".repeat(n)).collect();
        assert_eq!(cell.steps(), expected.as_slice());
        assert!(!cell.is_resolvable());
        assert!(matches!(cell.canonical(), Err(FormatError::Diverged { .. })));
    }

    #[test]
    fn test_limit_bounds_trace() {
        let cell = PaddedCell::check_with_limit(
            &formatter(|s| format!("{s}x")),
            Path::new("f"),
            "",
            3,
        )
        .unwrap();
        assert_eq!(cell.steps(), ["x", "xx", "xxx"]);
        assert_eq!(cell.user_message(), "diverges after 3 steps");
    }

    #[test]
    fn test_any_misbehave_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for (name, content) in [("ok.txt", "A"), ("bad.txt", "B"), ("never.txt", "A")] {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(content.as_bytes()).unwrap();
            files.push(path);
        }
        // "A" is a fixed point, anything else ping-pongs between B and C
        let formatter = formatter(|s| {
            let next = match s {
                "A" => "A",
                "B" => "C",
                _ => "B",
            };
            next.to_string()
        });
        let first = PaddedCell::first_misbehaving(&formatter, &files, Duration::from_secs(60))
            .unwrap()
            .unwrap();
        assert!(first.file().ends_with("bad.txt"));
        assert!(PaddedCell::any_misbehave(&formatter, &files).unwrap());
        assert!(!PaddedCell::any_misbehave(&formatter, &files[..1]).unwrap());
    }

    #[test]
    fn test_any_misbehave_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let bad = dir.path().join("bad.txt");
        std::fs::write(&good, "A").unwrap();
        std::fs::write(&bad, "B").unwrap();
        let formatter = formatter(|s| if s == "A" { s.to_string() } else { format!("C{s}") });
        let found =
            PaddedCell::first_misbehaving(&formatter, &[good, bad], Duration::ZERO).unwrap();
        assert!(found.is_none());
    }
}

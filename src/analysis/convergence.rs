//! Convergence analysis used when applying formatting.
//!
//! Starting from a file's content `s0`, the analyzer computes
//! `s1 = f(s0), s2 = f(s1), ...` and stops at the first of:
//!
//! - `s1 == s0`: the file is already clean
//! - `s(n+1) == s(n)`: a fixed point, the pipeline converges
//! - `s(n+1)` equals an earlier state: a cycle
//! - the attempt budget is spent: divergence

use std::path::Path;

use indexmap::IndexSet;
use tracing::{debug, trace};

use super::canonical::canonical;
use crate::error::FormatError;
use crate::formatter::Formatter;

/// Number of pipeline applications tried before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Outcome of [`ConvergenceAnalyzer::analyze`].
///
/// Every trace lists distinct states in the order they were first produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// The file needs no formatting
    Clean,
    /// States up to and including the fixed point
    Convergence(Vec<String>),
    /// The repeating states only, without the states leading into the loop
    Cycle(Vec<String>),
    /// Every state produced before the attempt budget ran out
    Divergence(Vec<String>),
}

impl ConvergenceResult {
    /// States recorded by the analysis (empty for [`ConvergenceResult::Clean`])
    #[must_use]
    pub fn trace(&self) -> &[String] {
        match self {
            ConvergenceResult::Clean => &[],
            ConvergenceResult::Convergence(states)
            | ConvergenceResult::Cycle(states)
            | ConvergenceResult::Divergence(states) => states,
        }
    }

    /// Text to persist: the fixed point of a convergence, the canonical
    /// state of a cycle, nothing otherwise
    #[must_use]
    pub fn try_formatted(&self) -> Option<&str> {
        match self {
            ConvergenceResult::Convergence(states) => states.last().map(String::as_str),
            ConvergenceResult::Cycle(states) => canonical(states),
            ConvergenceResult::Clean | ConvergenceResult::Divergence(_) => None,
        }
    }

    /// Same as [`try_formatted`](Self::try_formatted) for results known to carry a value.
    ///
    /// # Panics
    ///
    /// Panics for [`ConvergenceResult::Clean`] and [`ConvergenceResult::Divergence`],
    /// neither of which has a formatted value.
    #[must_use]
    pub fn formatted(&self) -> &str {
        match self {
            ConvergenceResult::Clean => panic!("The formatting result is not known"),
            ConvergenceResult::Divergence(_) => panic!("The formatting result diverges"),
            _ => self
                .try_formatted()
                .unwrap_or_else(|| panic!("{} result has an empty trace", self.describe())),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, ConvergenceResult::Clean)
    }

    /// Short label for reports
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            ConvergenceResult::Clean => "clean",
            ConvergenceResult::Convergence(_) => "converges",
            ConvergenceResult::Cycle(_) => "cycles",
            ConvergenceResult::Divergence(_) => "diverges",
        }
    }
}

/// Classifies repeated application of a [`Formatter`] to one file
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceAnalyzer<'a> {
    formatter: &'a Formatter,
    max_attempts: usize,
}

impl<'a> ConvergenceAnalyzer<'a> {
    #[must_use]
    pub fn new(formatter: &'a Formatter) -> Self {
        ConvergenceAnalyzer {
            formatter,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Analyze the current content of `file`
    pub fn analyze(&self, file: &Path) -> Result<ConvergenceResult, FormatError> {
        debug!("Analyzing convergence of {}", file.display());
        let raw = self.formatter.read_raw(file)?;
        self.analyze_text(&raw, file)
    }

    /// Analyze `raw` as if it were the content of `file`.
    ///
    /// Step failures abort the analysis and are returned as is.
    pub fn analyze_text(&self, raw: &str, file: &Path) -> Result<ConvergenceResult, FormatError> {
        let Some(formatted) = self.formatter.format_text_if_dirty(raw, file)? else {
            return Ok(ConvergenceResult::Clean);
        };
        let once_more = self.formatter.compute(&formatted, file)?;
        if once_more == formatted {
            return Ok(ConvergenceResult::Convergence(vec![formatted]));
        }
        debug!(
            "Formatting {} twice gives a different result, chasing a fixed point",
            file.display()
        );

        // Insertion order is first-seen order; state `i` was produced by application `i + 1`
        let mut seen = IndexSet::new();
        seen.insert(formatted);
        seen.insert(once_more.clone());
        let mut current = once_more;
        for attempt in 3..=self.max_attempts {
            let next = self.formatter.compute(&current, file)?;
            if next == current {
                debug!("{} converges after {attempt} applications", file.display());
                return Ok(ConvergenceResult::Convergence(seen.into_iter().collect()));
            }
            if let Some(first_seen) = seen.get_index_of(&next) {
                debug!(
                    "{} cycles between {} states",
                    file.display(),
                    seen.len() - first_seen
                );
                return Ok(ConvergenceResult::Cycle(
                    seen.into_iter().skip(first_seen).collect(),
                ));
            }
            trace!(attempt, len = next.len(), "new state");
            seen.insert(next.clone());
            current = next;
        }
        debug!(
            "{} does not settle within {} applications",
            file.display(),
            self.max_attempts
        );
        Ok(ConvergenceResult::Divergence(seen.into_iter().collect()))
    }
}

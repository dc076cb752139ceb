//! The `check` and `apply` tasks.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use super::padded::{apply_any_changed, check_bulk, store_trace, FileFailure};
use crate::analysis::padded_cell::MAX_DETERMINE_PADDING;
use crate::analysis::{
    ConvergenceAnalyzer, ConvergenceResult, PaddedCell, PaddedCellKind, DEFAULT_MAX_ATTEMPTS,
};
use crate::error::FormatError;
use crate::formatter::Formatter;

/// Default directory receiving traces of misbehaving files
pub const DEFAULT_DIAGNOSE_DIR: &str = "build/restyle-diagnose";

/// Settings shared by both tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    /// Attempt budget of the convergence analysis
    pub max_attempts: usize,
    /// Resolve misbehaving files through their padded cell
    pub padded_cell: bool,
    /// Maximum number of states recorded per padded cell
    pub padded_cell_limit: usize,
    pub diagnose_dir: PathBuf,
}

impl Default for TaskOptions {
    fn default() -> Self {
        TaskOptions {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            padded_cell: false,
            padded_cell_limit: PaddedCell::MAX_CYCLE,
            diagnose_dir: PathBuf::from(DEFAULT_DIAGNOSE_DIR),
        }
    }
}

#[derive(Debug)]
pub enum CheckOutcome {
    /// Every file is formatted
    Clean,
    /// Files that are not formatted
    Violations(Vec<PathBuf>),
    /// A file misbehaves, and only padded-cell mode can make the check pass
    PaddedCellRecommended {
        cell: PaddedCell,
        trace: Vec<PathBuf>,
    },
}

#[derive(Debug)]
pub struct CheckReport {
    pub checked: usize,
    pub outcome: CheckOutcome,
    pub failures: Vec<FileFailure>,
}

impl CheckReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && matches!(self.outcome, CheckOutcome::Clean)
    }
}

#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Files rewritten on disk
    pub changed: Vec<PathBuf>,
    /// Files whose formatting cycles, left untouched (unless in padded-cell mode)
    pub cycles: Vec<PathBuf>,
    /// Files whose formatting never settles, left untouched
    pub divergences: Vec<PathBuf>,
    /// Trace files written under the diagnose directory
    pub traces: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
    /// The first cycling file with its trace, which padded-cell mode would settle
    pub padded_cell_recommended: Option<(PaddedCell, Vec<PathBuf>)>,
}

impl ApplyReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cycles.is_empty() && self.divergences.is_empty()
    }

    /// One-line summary of the files that could not be formatted, if any
    #[must_use]
    pub fn unsettled_summary(&self, formatter: &Formatter) -> Option<String> {
        let list = |files: &[PathBuf]| {
            files
                .iter()
                .map(|f| formatter.relativize(f).display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut parts = Vec::new();
        if !self.cycles.is_empty() {
            parts.push(format!("cycles for {}", list(&self.cycles)));
        }
        if !self.divergences.is_empty() {
            parts.push(format!("diverges for {}", list(&self.divergences)));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("Formatting {}", parts.join(", ")))
        }
    }
}

/// Per-file result of the apply task
enum Applied {
    Unchanged,
    Changed,
    Cycle(PaddedCell, Vec<PathBuf>),
    Diverge(Vec<PathBuf>),
    /// Padded-cell mode: written (or not), with the trace of a misbehaving cell
    Padded {
        changed: bool,
        resolvable: bool,
        trace: Vec<PathBuf>,
    },
}

/// Check that every file in `files` is formatted.
///
/// A file that cannot be read or formatted ends up in `failures` and does not
/// keep the other files from being checked.
#[must_use]
pub fn check_files(formatter: &Formatter, files: &[PathBuf], options: &TaskOptions) -> CheckReport {
    let results: Vec<(PathBuf, Result<bool, FormatError>)> = files
        .par_iter()
        .map(|file| (file.clone(), formatter.is_clean(file)))
        .collect();

    let mut problems = Vec::new();
    let mut failures = Vec::new();
    for (file, result) in results {
        match result {
            Ok(true) => {}
            Ok(false) => problems.push(file),
            Err(error) => failures.push(FileFailure { file, error }),
        }
    }

    let outcome = if options.padded_cell {
        if problems.is_empty() {
            info!("padded-cell mode is on, but no file needs it");
        }
        let bulk = check_bulk(
            formatter,
            &options.diagnose_dir,
            &problems,
            options.padded_cell_limit,
        );
        failures.extend(bulk.failures);
        if bulk.still_failing.is_empty() {
            CheckOutcome::Clean
        } else {
            CheckOutcome::Violations(bulk.still_failing)
        }
    } else if let Some(cell) = find_misbehaving(formatter, &mut problems, &mut failures) {
        match store_trace(formatter, &options.diagnose_dir, cell.file(), cell.steps()) {
            Ok(trace) => CheckOutcome::PaddedCellRecommended { cell, trace },
            Err(error) => {
                failures.push(FileFailure {
                    file: cell.file().to_path_buf(),
                    error,
                });
                CheckOutcome::PaddedCellRecommended {
                    cell,
                    trace: Vec::new(),
                }
            }
        }
    } else if problems.is_empty() {
        CheckOutcome::Clean
    } else {
        CheckOutcome::Violations(problems)
    };

    CheckReport {
        checked: files.len(),
        outcome,
        failures,
    }
}

/// First misbehaving cell among `problems`, searched for at most [`MAX_DETERMINE_PADDING`].
///
/// Files that fail while being chased move from `problems` to `failures`.
fn find_misbehaving(
    formatter: &Formatter,
    problems: &mut Vec<PathBuf>,
    failures: &mut Vec<FileFailure>,
) -> Option<PaddedCell> {
    let start = Instant::now();
    let mut index = 0;
    while index < problems.len() {
        match PaddedCell::check(formatter, &problems[index]) {
            Ok(cell) if cell.misbehaved() => {
                debug!("{} {}", cell.file().display(), cell.user_message());
                return Some(cell);
            }
            Ok(_) => index += 1,
            Err(error) => {
                let file = problems.remove(index);
                failures.push(FileFailure { file, error });
            }
        }
        if start.elapsed() > MAX_DETERMINE_PADDING {
            debug!("No misbehaving file found within {MAX_DETERMINE_PADDING:?}");
            return None;
        }
    }
    None
}

/// Format every file in `files` in place
#[must_use]
pub fn apply_files(formatter: &Formatter, files: &[PathBuf], options: &TaskOptions) -> ApplyReport {
    let results: Vec<(PathBuf, Result<Applied, FormatError>)> = files
        .par_iter()
        .map(|file| (file.clone(), apply_one(formatter, file, options)))
        .collect();

    let mut report = ApplyReport::default();
    for (file, result) in results {
        match result {
            Ok(Applied::Unchanged) => {}
            Ok(Applied::Changed) => report.changed.push(file),
            Ok(Applied::Cycle(cell, trace)) => {
                report.cycles.push(file);
                report.traces.extend(trace.iter().cloned());
                if report.padded_cell_recommended.is_none() {
                    report.padded_cell_recommended = Some((cell, trace));
                }
            }
            Ok(Applied::Diverge(trace)) => {
                report.divergences.push(file);
                report.traces.extend(trace);
            }
            Ok(Applied::Padded {
                changed,
                resolvable,
                trace,
            }) => {
                if changed {
                    report.changed.push(file);
                } else if !resolvable {
                    report.divergences.push(file);
                }
                report.traces.extend(trace);
            }
            Err(error) => report.failures.push(FileFailure { file, error }),
        }
    }
    report
}

fn apply_one(formatter: &Formatter, file: &Path, options: &TaskOptions) -> Result<Applied, FormatError> {
    if options.padded_cell {
        let applied = apply_any_changed(formatter, file, options.padded_cell_limit)?;
        let trace = if applied.cell.misbehaved() {
            store_trace(formatter, &options.diagnose_dir, file, applied.cell.steps())?
        } else {
            Vec::new()
        };
        return Ok(Applied::Padded {
            changed: applied.changed,
            resolvable: applied.cell.is_resolvable(),
            trace,
        });
    }

    let raw = formatter.read_raw(file)?;
    let analyzer = ConvergenceAnalyzer::new(formatter).with_max_attempts(options.max_attempts);
    let result = analyzer.analyze_text(&raw, file)?;
    debug!("{} {}", file.display(), result.describe());
    match result {
        ConvergenceResult::Clean => Ok(Applied::Unchanged),
        ConvergenceResult::Convergence(states) => {
            let formatted = states.last().map_or("", String::as_str);
            formatter.write(file, formatted, &raw)?;
            Ok(Applied::Changed)
        }
        ConvergenceResult::Cycle(states) => {
            let trace = store_trace(formatter, &options.diagnose_dir, file, &states)?;
            let cell = PaddedCell::new(PaddedCellKind::Cycle, file, states);
            Ok(Applied::Cycle(cell, trace))
        }
        ConvergenceResult::Divergence(states) => Ok(Applied::Diverge(store_trace(
            formatter,
            &options.diagnose_dir,
            file,
            &states,
        )?)),
    }
}

/// Explanation shown when a file fails because a step cannot make up its mind
#[must_use]
pub fn padded_cell_message(formatter: &Formatter, cell: &PaddedCell, trace: &[PathBuf]) -> String {
    let trace_dir = trace
        .first()
        .and_then(|p| p.parent())
        .map_or_else(String::new, |p| p.display().to_string());
    format!(
        "You have a misbehaving rule which can't make up its mind.\n\
         This means that the check will fail even after formatting was applied.\n\
         \n\
         The file in question is {}\n\
         Formatting {}\n\
         You can find intermediate results in {trace_dir}\n\
         \n\
         This is a bug in a formatting step, not in restyle itself, but restyle can\n\
         work around it and settle on a canonical result if you enable padded-cell\n\
         mode, either with `--padded-cell` or `padded_cell = true` in restyle.toml.",
        formatter.relativize(cell.file()).display(),
        cell.user_message(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{FnStep, TrimTrailingWhitespace};

    fn options(diagnose: &Path) -> TaskOptions {
        TaskOptions {
            diagnose_dir: diagnose.to_path_buf(),
            ..TaskOptions::default()
        }
    }

    #[test]
    fn test_check_reports_violations() {
        let root = tempfile::tempdir().unwrap();
        let formatter = Formatter::builder()
            .root_dir(root.path())
            .step(TrimTrailingWhitespace)
            .build();
        let clean = root.path().join("clean.txt");
        let dirty = root.path().join("dirty.txt");
        std::fs::write(&clean, "a\n").unwrap();
        std::fs::write(&dirty, "a  \n").unwrap();

        let report = check_files(
            &formatter,
            &[clean, dirty.clone()],
            &options(&root.path().join("diag")),
        );
        assert_eq!(report.checked, 2);
        assert!(!report.is_success());
        match report.outcome {
            CheckOutcome::Violations(files) => assert_eq!(files, vec![dirty]),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_check_recommends_padded_cell() {
        let root = tempfile::tempdir().unwrap();
        let diag = root.path().join("diag");
        let formatter = Formatter::builder()
            .root_dir(root.path())
            .step(FnStep::new("pingPong", |s| {
                (if s == "A" { "B" } else { "A" }).to_string()
            }))
            .build();
        let file = root.path().join("f.txt");
        std::fs::write(&file, "A").unwrap();

        let report = check_files(&formatter, &[file], &options(&diag));
        let CheckOutcome::PaddedCellRecommended { cell, trace } = &report.outcome else {
            panic!("expected a padded cell recommendation");
        };
        assert_eq!(trace.len(), 2);
        let message = padded_cell_message(&formatter, cell, trace);
        assert!(message.contains("f.txt"));
        assert!(message.contains("cycles between 2 steps"));
    }

    #[test]
    fn test_check_with_padded_cell_passes_on_canonical() {
        let root = tempfile::tempdir().unwrap();
        let formatter = Formatter::builder()
            .root_dir(root.path())
            .step(FnStep::new("pingPong", |s| {
                (if s == "A" { "B" } else { "A" }).to_string()
            }))
            .build();
        let file = root.path().join("f.txt");
        std::fs::write(&file, "A").unwrap();
        let opts = TaskOptions {
            padded_cell: true,
            ..options(&root.path().join("diag"))
        };
        let report = check_files(&formatter, &[file], &opts);
        assert!(report.is_success(), "{report:?}");
    }

    #[test]
    fn test_apply_writes_convergent_files_only() {
        let root = tempfile::tempdir().unwrap();
        let diag = root.path().join("diag");
        let formatter = Formatter::builder()
            .root_dir(root.path())
            .step(FnStep::new("step", |s| {
                if s.starts_with("grow") {
                    format!("{s}!")
                } else {
                    s.trim_end().to_string()
                }
            }))
            .build();
        let clean = root.path().join("clean.txt");
        let dirty = root.path().join("dirty.txt");
        let growing = root.path().join("growing.txt");
        std::fs::write(&clean, "ok").unwrap();
        std::fs::write(&dirty, "ok   ").unwrap();
        std::fs::write(&growing, "grow").unwrap();

        let report = apply_files(
            &formatter,
            &[clean.clone(), dirty.clone(), growing.clone()],
            &options(&diag),
        );
        assert_eq!(report.changed, vec![dirty.clone()]);
        assert_eq!(report.divergences, vec![growing.clone()]);
        assert_eq!(report.traces.len(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(std::fs::read_to_string(&dirty).unwrap(), "ok");
        assert_eq!(std::fs::read_to_string(&growing).unwrap(), "grow");
        assert!(diag.join("growing.txt.09").exists());
        assert_eq!(
            report.unsettled_summary(&formatter).as_deref(),
            Some("Formatting diverges for growing.txt")
        );
    }

    #[test]
    fn test_apply_collects_step_failures() {
        let root = tempfile::tempdir().unwrap();
        let formatter = Formatter::builder()
            .root_dir(root.path())
            .step(FnStep::with_file("strict", |s, _| {
                if s.contains("fubar") {
                    anyhow::bail!("No swearing!");
                }
                Ok(Some(s.to_uppercase()))
            }))
            .build();
        let bad = root.path().join("bad.txt");
        let good = root.path().join("good.txt");
        std::fs::write(&bad, "fubar").unwrap();
        std::fs::write(&good, "fine").unwrap();

        let report = apply_files(
            &formatter,
            &[bad.clone(), good.clone()],
            &options(&root.path().join("diag")),
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, bad);
        assert_eq!(report.changed, vec![good.clone()]);
        assert_eq!(std::fs::read_to_string(&good).unwrap(), "FINE");
    }

    #[test]
    fn test_apply_cycle_reported_and_resolved_in_padded_mode() {
        let root = tempfile::tempdir().unwrap();
        let diag = root.path().join("diag");
        let formatter = Formatter::builder()
            .root_dir(root.path())
            .step(FnStep::new("pingPong", |s| {
                (if s == "A" { "B" } else { "A" }).to_string()
            }))
            .build();
        let file = root.path().join("f.txt");
        std::fs::write(&file, "CCC").unwrap();

        let report = apply_files(&formatter, &[file.clone()], &options(&diag));
        assert_eq!(report.cycles, vec![file.clone()]);
        let (cell, trace) = report.padded_cell_recommended.as_ref().unwrap();
        assert_eq!(cell.steps(), ["A", "B"]);
        let message = padded_cell_message(&formatter, cell, trace);
        assert!(message.contains("cycles between 2 steps"));
        assert!(message.contains("--padded-cell"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "CCC");
        assert_eq!(
            report.unsettled_summary(&formatter).as_deref(),
            Some("Formatting cycles for f.txt")
        );

        let padded = TaskOptions {
            padded_cell: true,
            ..options(&diag)
        };
        let report = apply_files(&formatter, &[file.clone()], &padded);
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.changed, vec![file.clone()]);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "A");
    }

    /// Maps "x" to "fubar" and rejects "fubar", so "x" fails only on the second application
    fn strict_on_reapply(root: &Path) -> Formatter {
        Formatter::builder()
            .root_dir(root)
            .step(FnStep::with_file("strict", |s, _| {
                if s.contains("fubar") {
                    anyhow::bail!("No swearing!");
                }
                if s == "x" {
                    return Ok(Some("fubar".to_string()));
                }
                Ok(Some(s.trim_end().to_string()))
            }))
            .build()
    }

    #[test]
    fn test_check_failure_on_reapplication_keeps_other_violations() {
        let root = tempfile::tempdir().unwrap();
        let formatter = strict_on_reapply(root.path());
        let bad = root.path().join("bad.txt");
        let dirty = root.path().join("dirty.txt");
        std::fs::write(&bad, "x").unwrap();
        std::fs::write(&dirty, "ok   ").unwrap();

        let report = check_files(
            &formatter,
            &[bad.clone(), dirty.clone()],
            &options(&root.path().join("diag")),
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, bad);
        assert_eq!(report.failures[0].error.step_name(), Some("strict"));
        match report.outcome {
            CheckOutcome::Violations(files) => assert_eq!(files, vec![dirty]),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_padded_check_failure_on_reapplication_keeps_other_violations() {
        let root = tempfile::tempdir().unwrap();
        let formatter = strict_on_reapply(root.path());
        let bad = root.path().join("bad.txt");
        let dirty = root.path().join("dirty.txt");
        std::fs::write(&bad, "x").unwrap();
        std::fs::write(&dirty, "ok   ").unwrap();
        let opts = TaskOptions {
            padded_cell: true,
            ..options(&root.path().join("diag"))
        };

        let report = check_files(&formatter, &[bad.clone(), dirty.clone()], &opts);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, bad);
        match report.outcome {
            CheckOutcome::Violations(files) => assert_eq!(files, vec![dirty]),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

//! Padded-cell helpers that touch the filesystem.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::analysis::PaddedCell;
use crate::error::FormatError;
use crate::formatter::Formatter;
use crate::line_ending::to_unix;

/// A file that could not be processed, with the reason
#[derive(Debug)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: FormatError,
}

/// Drop `.` and resolve `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Location of `file`'s trace relative to the diagnose directory.
///
/// Files under the root keep their relative path. Files outside it keep their
/// whole path minus the root component, so two such files never share a trace.
fn trace_path(formatter: &Formatter, file: &Path) -> PathBuf {
    let root = normalize(formatter.root_dir());
    let absolute = normalize(&root.join(file));
    match absolute.strip_prefix(&root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => absolute
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect(),
    }
}

/// Write each of `states` under `diagnose_dir` as `<relative path of file>.NN`.
///
/// Returns the written paths, in state order. The trace always lands inside
/// `diagnose_dir`, whatever `..` components `file` carries.
pub fn store_trace(
    formatter: &Formatter,
    diagnose_dir: &Path,
    file: &Path,
    states: &[String],
) -> Result<Vec<PathBuf>, FormatError> {
    let target = diagnose_dir.join(trace_path(formatter, file));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FormatError::io(parent, e))?;
    }
    let mut written = Vec::with_capacity(states.len());
    for (index, state) in states.iter().enumerate() {
        let mut name: OsString = target.clone().into_os_string();
        name.push(format!(".{index:02}"));
        let path = PathBuf::from(name);
        let bytes = formatter.encoding().encode(state, &path)?;
        std::fs::write(&path, bytes).map_err(|e| FormatError::io(&path, e))?;
        written.push(path);
    }
    Ok(written)
}

/// Outcome of [`check_bulk`]
#[derive(Debug, Default)]
pub struct BulkCheck {
    /// Files whose content is not their canonical value
    pub still_failing: Vec<PathBuf>,
    /// Files that could not be checked
    pub failures: Vec<FileFailure>,
}

/// Padded-cell check of `files`.
///
/// Misbehaving files get their trace stored under `diagnose_dir`. A file
/// passes when its content equals the canonical value of its cell, so a
/// file already holding one state of a cycle is accepted as long as it is
/// the canonical one. A file that fails is recorded and the others are
/// still checked.
pub fn check_bulk(
    formatter: &Formatter,
    diagnose_dir: &Path,
    files: &[PathBuf],
    limit: usize,
) -> BulkCheck {
    let mut bulk = BulkCheck::default();
    for file in files {
        match check_one(formatter, diagnose_dir, file, limit) {
            Ok(true) => {}
            Ok(false) => bulk.still_failing.push(file.clone()),
            Err(error) => bulk.failures.push(FileFailure {
                file: file.clone(),
                error,
            }),
        }
    }
    bulk
}

/// Whether `file` holds the canonical value of its padded cell
fn check_one(
    formatter: &Formatter,
    diagnose_dir: &Path,
    file: &Path,
    limit: usize,
) -> Result<bool, FormatError> {
    let raw = formatter.read_raw(file)?;
    let cell = PaddedCell::check_with_limit(formatter, file, &to_unix(&raw), limit)?;
    if cell.misbehaved() {
        debug!(
            "{} {}",
            formatter.relativize(file).display(),
            cell.user_message()
        );
        store_trace(formatter, diagnose_dir, file, cell.steps())?;
    }
    let Ok(canonical) = cell.canonical() else {
        return Ok(false);
    };
    Ok(formatter.compute_line_endings(canonical, &raw) == raw)
}

/// Outcome of [`apply_any_changed`]
#[derive(Debug, Clone)]
pub struct PaddedApply {
    pub cell: PaddedCell,
    /// Whether the file was rewritten
    pub changed: bool,
}

/// Write the canonical value of `file`'s padded cell when it differs from the content.
///
/// Diverging files are left untouched.
pub fn apply_any_changed(
    formatter: &Formatter,
    file: &Path,
    limit: usize,
) -> Result<PaddedApply, FormatError> {
    let raw = formatter.read_raw(file)?;
    let cell = PaddedCell::check_with_limit(formatter, file, &to_unix(&raw), limit)?;
    let changed = match cell.canonical() {
        Ok(canonical) if formatter.compute_line_endings(canonical, &raw) != raw => {
            formatter.write(file, canonical, &raw)?;
            true
        }
        _ => false,
    };
    Ok(PaddedApply { cell, changed })
}

//! Check and apply tasks over many files.
//!
//! This is the layer between the analyzers and the command line:
//!
//! **Check:**
//! - Find the files that are not clean (in parallel)
//! - Without padded-cell mode, recommend it when one of them misbehaves,
//!   otherwise report them as violations
//! - With padded-cell mode, store the trace of misbehaving files and report
//!   only files that differ from their canonical value
//!
//! **Apply:**
//! - Run the convergence analysis per file (in parallel)
//! - Write back converging files, store traces of cycling and diverging ones
//!
//! A file that fails is reported in the task's `failures` and the remaining
//! files are still processed.
//!
//! Traces are written under a diagnose directory, mirroring each file's path
//! relative to the formatter root, one file per state (`<path>.00`, `<path>.01`, ...).
//! Files outside the root are mirrored by their full path.

pub mod padded;
pub mod tasks;

pub use padded::{apply_any_changed, check_bulk, store_trace, BulkCheck, FileFailure, PaddedApply};
pub use tasks::{
    apply_files, check_files, padded_cell_message, ApplyReport, CheckOutcome, CheckReport,
    TaskOptions,
};

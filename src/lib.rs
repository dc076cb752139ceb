//! restyle - a pipeline of formatting steps with idempotence diagnostics
//!
//! A [`Formatter`] runs an ordered list of [`FormatterStep`]s over a file. Since
//! nothing guarantees that applying the pipeline twice gives the same result as
//! applying it once, two analyzers classify what repeated application does:
//! [`ConvergenceAnalyzer`] (used when writing files) and [`PaddedCell`] (used to
//! diagnose, and optionally work around, misbehaving steps).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod formatter;
pub mod line_ending;
pub mod process;
pub mod step;

// Re-export commonly used types
pub use analysis::{ConvergenceAnalyzer, ConvergenceResult, PaddedCell, PaddedCellKind};
pub use cli::{build_cli, parse_args, parse_args_from, CliArgs};
pub use config::{Config, StepConfig};
pub use encoding::Encoding;
pub use error::{FormatError, Result};
pub use formatter::{ErrorPolicy, Formatter, FormatterBuilder};
pub use line_ending::LineEnding;
pub use step::{FnStep, FormatterStep, StepFingerprint};

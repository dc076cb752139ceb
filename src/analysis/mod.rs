//! Idempotence analysis of a formatting pipeline.
//!
//! A well behaved pipeline `f` is idempotent: `f(f(s)) == f(s)`. When it is
//! not, repeatedly applying it either settles on a fixed point, loops through
//! a cycle, or keeps producing new text. Both analyzers here chase that
//! sequence for a bounded number of applications and classify it:
//!
//! - [`ConvergenceAnalyzer`]: four-way [`ConvergenceResult`] used when applying
//!   formatting (clean / converges / cycles / diverges)
//! - [`PaddedCell`]: diagnostic trace of a misbehaving pipeline for one file,
//!   plus bulk helpers deciding whether padded-cell mode should be suggested
//! - [`canonical`]: the deterministic pick among the states of a cycle

pub mod canonical;
pub mod convergence;
pub mod padded_cell;

pub use canonical::canonical;
pub use convergence::{ConvergenceAnalyzer, ConvergenceResult, DEFAULT_MAX_ATTEMPTS};
pub use padded_cell::{PaddedCell, PaddedCellKind};

//! Command-line interface for restyle.
//!
//! Defines CLI arguments using clap builder API

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Arg, ArgAction, Command};

use crate::config::Config;
use crate::encoding::Encoding;
use crate::line_ending::LineEnding;

/// CLI arguments parsed from command line
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Files to format
    pub files: Vec<PathBuf>,

    /// Check formatting without modifying files
    pub check: bool,

    /// Settle misbehaving files on their canonical value
    pub padded_cell: bool,

    /// Config file path
    pub config: Option<PathBuf>,

    pub line_endings: Option<LineEnding>,

    pub encoding: Option<Encoding>,

    /// Attempt budget of the convergence analysis
    pub max_attempts: Option<usize>,

    /// Directory receiving traces of misbehaving files
    pub diagnose_dir: Option<PathBuf>,

    /// Number of parallel jobs (0 = auto, 1 = sequential)
    pub jobs: Option<usize>,

    /// Enable debug output
    pub debug: bool,

    /// Silent mode (no output)
    pub silent: bool,
}

impl CliArgs {
    /// Override `config` with every option given on the command line
    pub fn apply_to(&self, config: &mut Config) {
        if self.padded_cell {
            config.padded_cell = true;
        }
        if let Some(v) = self.line_endings {
            config.line_endings = v;
        }
        if let Some(v) = self.encoding {
            config.encoding = v;
        }
        if let Some(v) = self.max_attempts {
            config.max_attempts = v;
        }
        if let Some(v) = &self.diagnose_dir {
            config.diagnose_dir.clone_from(v);
        }
    }
}

/// Build the clap Command for parsing CLI arguments
#[must_use]
pub fn build_cli() -> Command {
    Command::new("restyle")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a pipeline of formatting steps and diagnoses steps that are not idempotent")
        .arg(
            Arg::new("files")
                .help("Files to format")
                .value_name("FILE")
                .num_args(1..)
                .required(false)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Report unformatted files instead of rewriting them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("padded-cell")
                .long("padded-cell")
                .help("Settle files whose formatting cycles on a canonical result")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to config file (disables auto-discovery)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("line-endings")
                .long("line-endings")
                .help("Line endings to write: unix, windows, platform-native, preserve [default: unix]")
                .value_name("POLICY")
                .value_parser(LineEnding::from_str),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .help("File encoding: utf-8, latin-1 [default: utf-8]")
                .value_name("NAME")
                .value_parser(Encoding::from_str),
        )
        .arg(
            Arg::new("max-attempts")
                .long("max-attempts")
                .help("Pipeline applications tried before a file is declared diverging [default: 10]")
                .value_name("NUM")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("diagnose-dir")
                .long("diagnose-dir")
                .help("Directory receiving the states of misbehaving files [default: build/restyle-diagnose]")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .help("Enable debug output (shows config, per-file analysis)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('S')
                .long("silent")
                .help("Silent mode (no output, for editor integration)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .help("Number of parallel jobs (0=auto, 1=sequential)")
                .value_name("NUM")
                .value_parser(clap::value_parser!(usize)),
        )
}

/// Parse CLI arguments from command line
#[must_use]
pub fn parse_args() -> CliArgs {
    args_from_matches(&build_cli().get_matches())
}

/// Parse CLI arguments from an iterator (for testing)
#[must_use]
pub fn parse_args_from<I, T>(args: I) -> CliArgs
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    args_from_matches(&build_cli().get_matches_from(args))
}

/// Convert clap `ArgMatches` to `CliArgs`
fn args_from_matches(matches: &clap::ArgMatches) -> CliArgs {
    CliArgs {
        files: matches
            .get_many::<PathBuf>("files")
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default(),
        check: matches.get_flag("check"),
        padded_cell: matches.get_flag("padded-cell"),
        config: matches.get_one::<PathBuf>("config").cloned(),
        line_endings: matches.get_one::<LineEnding>("line-endings").copied(),
        encoding: matches.get_one::<Encoding>("encoding").copied(),
        max_attempts: matches.get_one::<usize>("max-attempts").copied(),
        diagnose_dir: matches.get_one::<PathBuf>("diagnose-dir").cloned(),
        jobs: matches.get_one::<usize>("jobs").copied(),
        debug: matches.get_flag("debug"),
        silent: matches.get_flag("silent"),
    }
}

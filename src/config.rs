//! Configuration management for restyle.
//!
//! This module provides the [`Config`] struct which controls the formatting pipeline.
//! Configuration can be loaded from:
//! - TOML files (`restyle.toml`)
//! - CLI arguments (which override file settings)
//!
//! Config files are auto-discovered in the user's home directory and in every
//! ancestor of the start directory, the most specific file winning.
//!
//! ```toml
//! line_endings = "unix"
//! max_attempts = 10
//! ignore_error_for_step = ["license header"]
//!
//! [[steps]]
//! type = "trim_trailing_whitespace"
//!
//! [[steps]]
//! type = "replace_regex"
//! name = "single space after comma"
//! pattern = ",[ ]{2,}"
//! replacement = ", "
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::{PaddedCell, DEFAULT_MAX_ATTEMPTS};
use crate::encoding::Encoding;
use crate::error::Result;
use crate::formatter::{ErrorPolicy, Formatter};
use crate::line_ending::LineEnding;
use crate::process::TaskOptions;
use crate::step::{EndWithNewline, FormatterStep, Replace, ReplaceRegex, TrimTrailingWhitespace};

/// Config file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["restyle.toml"];

/// Get the user's home directory
fn dirs_home() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home));
    }
    // Fallback for Windows
    if let Ok(userprofile) = std::env::var("USERPROFILE") {
        return Some(PathBuf::from(userprofile));
    }
    None
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}
fn default_padded_cell_limit() -> usize {
    PaddedCell::MAX_CYCLE
}
fn default_diagnose_dir() -> PathBuf {
    PathBuf::from(crate::process::tasks::DEFAULT_DIAGNOSE_DIR)
}

/// One `[[steps]]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    TrimTrailingWhitespace,
    EndWithNewline,
    Replace {
        name: String,
        find: String,
        #[serde(default)]
        replacement: String,
    },
    ReplaceRegex {
        name: String,
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
}

impl StepConfig {
    /// Instantiate the step
    pub fn build(&self) -> Result<Box<dyn FormatterStep>> {
        Ok(match self {
            StepConfig::TrimTrailingWhitespace => Box::new(TrimTrailingWhitespace),
            StepConfig::EndWithNewline => Box::new(EndWithNewline),
            StepConfig::Replace {
                name,
                find,
                replacement,
            } => Box::new(Replace::new(name, find, replacement)?),
            StepConfig::ReplaceRegex {
                name,
                pattern,
                replacement,
            } => Box::new(ReplaceRegex::new(name, pattern, replacement)?),
        })
    }
}

/// Main configuration struct for restyle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Line endings written back to files (default: unix)
    #[serde(default)]
    pub line_endings: LineEnding,

    /// Encoding of the files (default: utf-8)
    #[serde(default)]
    pub encoding: Encoding,

    /// Pipeline applications tried by the convergence analysis (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// States recorded per padded cell (default: 10)
    #[serde(default = "default_padded_cell_limit")]
    pub padded_cell_limit: usize,

    /// Settle misbehaving files on their canonical value (default: false)
    #[serde(default)]
    pub padded_cell: bool,

    /// Steps whose failures are only warned about
    #[serde(default)]
    pub ignore_error_for_step: Vec<String>,

    /// Files (relative to the project root) whose step failures are only warned about
    #[serde(default)]
    pub ignore_error_for_path: Vec<String>,

    /// Where traces of misbehaving files are written (default: build/restyle-diagnose)
    #[serde(default = "default_diagnose_dir")]
    pub diagnose_dir: PathBuf,

    /// The pipeline, in order
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Partial configuration for TOML parsing
///
/// All fields are `Option<T>` so we can distinguish between
/// "explicitly set" and "not specified" when merging configs.
#[derive(Debug, Clone, Default, Deserialize)]
struct PartialConfig {
    pub line_endings: Option<LineEnding>,
    pub encoding: Option<Encoding>,
    pub max_attempts: Option<usize>,
    pub padded_cell_limit: Option<usize>,
    pub padded_cell: Option<bool>,
    #[serde(default)]
    pub ignore_error_for_step: Vec<String>,
    #[serde(default)]
    pub ignore_error_for_path: Vec<String>,
    pub diagnose_dir: Option<PathBuf>,
    pub steps: Option<Vec<StepConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            line_endings: LineEnding::default(),
            encoding: Encoding::default(),
            max_attempts: default_max_attempts(),
            padded_cell_limit: default_padded_cell_limit(),
            padded_cell: false,
            ignore_error_for_step: Vec::new(),
            ignore_error_for_path: Vec::new(),
            diagnose_dir: default_diagnose_dir(),
            steps: Vec::new(),
        }
    }
}

impl Config {
    /// Fewest applications that can tell a fixed point from a misbehaving step
    const MIN_ATTEMPTS: usize = 2;
    const MAX_ATTEMPTS: usize = 1000;

    /// Validate configuration values are within reasonable bounds
    ///
    /// Returns an error message if validation fails, None if valid.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        for (field, value) in [
            ("max_attempts", self.max_attempts),
            ("padded_cell_limit", self.padded_cell_limit),
        ] {
            if value < Self::MIN_ATTEMPTS {
                return Some(format!(
                    "{field} {value} is below minimum of {}",
                    Self::MIN_ATTEMPTS
                ));
            }
            if value > Self::MAX_ATTEMPTS {
                return Some(format!(
                    "{field} {value} exceeds maximum of {}",
                    Self::MAX_ATTEMPTS
                ));
            }
        }
        None
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.apply_partial(read_partial(path)?);
        Ok(config)
    }

    /// Apply a partial config, only overriding fields that are explicitly set
    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(v) = partial.line_endings {
            self.line_endings = v;
        }
        if let Some(v) = partial.encoding {
            self.encoding = v;
        }
        if let Some(v) = partial.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = partial.padded_cell_limit {
            self.padded_cell_limit = v;
        }
        if let Some(v) = partial.padded_cell {
            self.padded_cell = v;
        }
        if let Some(v) = partial.diagnose_dir {
            self.diagnose_dir = v;
        }
        // A more specific file replaces the whole pipeline
        if let Some(v) = partial.steps {
            self.steps = v;
        }
        // Exemptions accumulate
        for step in partial.ignore_error_for_step {
            if !self.ignore_error_for_step.contains(&step) {
                self.ignore_error_for_step.push(step);
            }
        }
        for path in partial.ignore_error_for_path {
            if !self.ignore_error_for_path.contains(&path) {
                self.ignore_error_for_path.push(path);
            }
        }
    }

    /// Discover config files for a start path
    ///
    /// Returns the home directory config first, then configs from the root down to
    /// the start directory (least specific first).
    #[must_use]
    pub fn discover_config_files(start_path: &Path) -> Vec<PathBuf> {
        let mut config_files = Vec::new();

        if let Some(home) = dirs_home() {
            for config_name in CONFIG_FILE_NAMES {
                let home_config = home.join(config_name);
                if home_config.is_file() {
                    config_files.push(home_config);
                }
            }
        }

        let start_dir = if start_path.is_file() {
            start_path.parent().map(Path::to_path_buf)
        } else if start_path.is_dir() {
            Some(start_path.to_path_buf())
        } else {
            std::env::current_dir().ok()
        };

        if let Some(dir) = start_dir {
            let mut ancestors: Vec<PathBuf> = dir.ancestors().map(Path::to_path_buf).collect();
            ancestors.reverse();

            for ancestor in ancestors {
                for config_name in CONFIG_FILE_NAMES {
                    let config_path = ancestor.join(config_name);
                    if config_path.is_file() && !config_files.contains(&config_path) {
                        config_files.push(config_path);
                    }
                }
            }
        }

        config_files
    }

    /// Load and merge configuration from discovered config files
    ///
    /// Later files override earlier ones (only explicitly set values). Unreadable
    /// files are skipped with a warning.
    #[must_use]
    pub fn from_discovered_files(start_path: &Path) -> Self {
        let mut config = Self::default();
        for path in Self::discover_config_files(start_path) {
            match read_partial(&path) {
                Ok(partial) => config.apply_partial(partial),
                Err(e) => warn!("Skipping config {}: {e:#}", path.display()),
            }
        }
        config
    }

    /// The error policy described by the `ignore_error_for_*` lists
    #[must_use]
    pub fn error_policy(&self) -> ErrorPolicy {
        let policy = self
            .ignore_error_for_step
            .iter()
            .fold(ErrorPolicy::strict(), |p, s| p.ignore_error_for_step(s));
        self.ignore_error_for_path
            .iter()
            .fold(policy, |p, path| p.ignore_error_for_path(path))
    }

    /// Build the formatter for files under `root_dir`
    pub fn build_formatter(&self, root_dir: &Path) -> Result<Formatter> {
        let steps = self
            .steps
            .iter()
            .map(StepConfig::build)
            .collect::<Result<Vec<_>>>()?;
        Ok(Formatter::builder()
            .steps(steps)
            .line_endings(self.line_endings)
            .encoding(self.encoding)
            .root_dir(root_dir)
            .error_policy(self.error_policy())
            .build())
    }

    /// Options for the check and apply tasks. A relative diagnose directory is
    /// resolved against `root_dir`.
    #[must_use]
    pub fn task_options(&self, root_dir: &Path) -> TaskOptions {
        TaskOptions {
            max_attempts: self.max_attempts,
            padded_cell: self.padded_cell,
            padded_cell_limit: self.padded_cell_limit,
            diagnose_dir: root_dir.join(&self.diagnose_dir),
        }
    }
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.padded_cell_limit, 10);
        assert!(!config.padded_cell);
        assert_eq!(config.line_endings, LineEnding::Unix);
        assert_eq!(config.diagnose_dir, PathBuf::from("build/restyle-diagnose"));
        assert!(config.steps.is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restyle.toml");
        std::fs::write(
            &path,
            r#"
line_endings = "windows"
encoding = "latin-1"
max_attempts = 20
padded_cell = true
ignore_error_for_step = ["header"]

[[steps]]
type = "trim_trailing_whitespace"

[[steps]]
type = "replace"
name = "tabs"
find = "\t"
replacement = "  "
"#,
        )
        .unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.line_endings, LineEnding::Windows);
        assert_eq!(config.encoding, Encoding::Latin1);
        assert_eq!(config.max_attempts, 20);
        assert!(config.padded_cell);
        assert_eq!(config.padded_cell_limit, 10);
        assert_eq!(config.ignore_error_for_step, vec!["header".to_string()]);
        assert_eq!(
            config.steps,
            vec![
                StepConfig::TrimTrailingWhitespace,
                StepConfig::Replace {
                    name: "tabs".to_string(),
                    find: "\t".to_string(),
                    replacement: "  ".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_value_names_match_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restyle.toml");
        std::fs::write(&path, "line_endings = \"CRLF\"\nencoding = \"Utf-8\"\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.line_endings, LineEnding::Windows);
        assert_eq!(config.encoding, Encoding::Utf8);
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let err = toml::from_str::<PartialConfig>("[[steps]]\ntype = \"prettier\"\n").unwrap_err();
        assert!(err.to_string().contains("prettier"));
    }

    #[test]
    fn test_config_apply_partial_preserves_unset() {
        let mut base = Config {
            max_attempts: 50,
            ..Default::default()
        };
        base.apply_partial(PartialConfig {
            padded_cell: Some(true),
            ..Default::default()
        });
        assert_eq!(base.max_attempts, 50);
        assert!(base.padded_cell);
    }

    #[test]
    fn test_config_apply_partial_merges_exemptions() {
        let mut base = Config::default();
        base.ignore_error_for_step.push("a".to_string());
        base.apply_partial(PartialConfig {
            ignore_error_for_step: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        });
        assert_eq!(base.ignore_error_for_step, vec!["a", "b"]);
    }

    #[test]
    fn test_more_specific_steps_replace_pipeline() {
        let mut base = Config {
            steps: vec![StepConfig::TrimTrailingWhitespace],
            ..Default::default()
        };
        base.apply_partial(PartialConfig {
            steps: Some(vec![StepConfig::EndWithNewline]),
            ..Default::default()
        });
        assert_eq!(base.steps, vec![StepConfig::EndWithNewline]);
    }

    #[test]
    fn test_discover_nested_configs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("restyle.toml"), "max_attempts = 5\n").unwrap();
        std::fs::write(nested.join("restyle.toml"), "padded_cell = true\n").unwrap();

        let files = Config::discover_config_files(&nested);
        let outer = files
            .iter()
            .position(|f| f == &dir.path().join("restyle.toml"))
            .unwrap();
        let inner = files
            .iter()
            .position(|f| f == &nested.join("restyle.toml"))
            .unwrap();
        assert!(outer < inner);

        let config = Config::from_discovered_files(&nested);
        assert_eq!(config.max_attempts, 5);
        assert!(config.padded_cell);
    }

    #[test]
    fn test_from_discovered_files_skips_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("restyle.toml"), "max_attempts = \"many\"\n").unwrap();
        let config = Config::from_discovered_files(dir.path());
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_none());
    }

    #[test]
    fn test_validate_max_attempts_bounds() {
        let low = Config {
            max_attempts: 1,
            ..Default::default()
        };
        assert!(low.validate().unwrap().contains("max_attempts"));
        let high = Config {
            max_attempts: 5000,
            ..Default::default()
        };
        assert!(high.validate().unwrap().contains("exceeds"));
    }

    #[test]
    fn test_validate_padded_cell_limit() {
        let config = Config {
            padded_cell_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap().contains("padded_cell_limit"));
    }

    #[test]
    fn test_build_formatter_applies_steps_in_order() {
        let config = Config {
            steps: vec![
                StepConfig::Replace {
                    name: "tabs".to_string(),
                    find: "\t".to_string(),
                    replacement: "    ".to_string(),
                },
                StepConfig::TrimTrailingWhitespace,
                StepConfig::EndWithNewline,
            ],
            ..Default::default()
        };
        let formatter = config.build_formatter(Path::new("/project")).unwrap();
        assert_eq!(formatter.steps().len(), 3);
        let out = formatter
            .compute("\tx\t\n\n", Path::new("/project/a.txt"))
            .unwrap();
        assert_eq!(out, "    x\n");
    }

    #[test]
    fn test_build_formatter_rejects_invalid_regex() {
        let config = Config {
            steps: vec![StepConfig::ReplaceRegex {
                name: "broken".to_string(),
                pattern: "(".to_string(),
                replacement: String::new(),
            }],
            ..Default::default()
        };
        assert!(config.build_formatter(Path::new(".")).is_err());
    }

    #[test]
    fn test_error_policy_from_config() {
        let config = Config {
            ignore_error_for_step: vec!["fails".to_string()],
            steps: vec![],
            ..Default::default()
        };
        let formatter = Formatter::builder()
            .step(crate::step::FnStep::with_file("fails", |_, _| {
                anyhow::bail!("nope")
            }))
            .error_policy(config.error_policy())
            .build();
        assert!(formatter.compute("x", Path::new("f")).is_ok());
    }

    #[test]
    fn test_task_options_resolve_diagnose_dir() {
        let options = Config::default().task_options(Path::new("/project"));
        assert_eq!(
            options.diagnose_dir,
            PathBuf::from("/project/build/restyle-diagnose")
        );
        assert_eq!(options.max_attempts, 10);
    }
}

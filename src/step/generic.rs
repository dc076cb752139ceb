//! Built-in, language-agnostic steps.
//!
//! These are the steps `restyle.toml` can name directly:
//! - [`TrimTrailingWhitespace`]: drop spaces and tabs before each newline
//! - [`EndWithNewline`]: end the text with exactly one `\n`
//! - [`Replace`]: literal find/replace
//! - [`ReplaceRegex`]: multi-line regex find/replace

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::FormatterStep;
use crate::error::FormatError;

static TRAILING_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());

/// `Some(output)` only when the step actually changed something
fn changed(input: &str, output: String) -> Option<String> {
    if output == input {
        None
    } else {
        Some(output)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrimTrailingWhitespace;

impl FormatterStep for TrimTrailingWhitespace {
    fn name(&self) -> &str {
        "trimTrailingWhitespace"
    }

    fn format(&self, input: &str, _file: &Path) -> anyhow::Result<Option<String>> {
        Ok(changed(
            input,
            TRAILING_WS_RE.replace_all(input, "").into_owned(),
        ))
    }
}

/// Empty text stays empty, whitespace-only text becomes a single newline
#[derive(Debug, Clone, Copy, Default)]
pub struct EndWithNewline;

impl FormatterStep for EndWithNewline {
    fn name(&self) -> &str {
        "endWithNewline"
    }

    fn format(&self, input: &str, _file: &Path) -> anyhow::Result<Option<String>> {
        if input.is_empty() {
            return Ok(None);
        }
        let mut output = input.trim_end().to_string();
        output.push('\n');
        Ok(changed(input, output))
    }
}

#[derive(Debug, Clone)]
pub struct Replace {
    name: String,
    find: String,
    replacement: String,
}

impl Replace {
    pub fn new(
        name: impl Into<String>,
        find: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Self, FormatError> {
        let name = name.into();
        let find = find.into();
        if find.is_empty() {
            return Err(FormatError::InvalidStep {
                step: name,
                reason: "'find' must not be empty".to_string(),
            });
        }
        Ok(Replace {
            name,
            find,
            replacement: replacement.into(),
        })
    }
}

impl FormatterStep for Replace {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> serde_json::Value {
        json!({ "find": self.find, "replacement": self.replacement })
    }

    fn format(&self, input: &str, _file: &Path) -> anyhow::Result<Option<String>> {
        if !input.contains(&self.find) {
            return Ok(None);
        }
        Ok(changed(input, input.replace(&self.find, &self.replacement)))
    }
}

/// Regex replacement with `^`/`$` matching at line boundaries.
///
/// The replacement string supports `$1` / `${name}` group references.
#[derive(Debug, Clone)]
pub struct ReplaceRegex {
    name: String,
    pattern: String,
    replacement: String,
    regex: Regex,
}

impl ReplaceRegex {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Self, FormatError> {
        let name = name.into();
        let pattern = pattern.into();
        let regex = Regex::new(&format!("(?m){pattern}")).map_err(|e| FormatError::InvalidStep {
            step: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(ReplaceRegex {
            name,
            pattern,
            replacement: replacement.into(),
            regex,
        })
    }
}

impl FormatterStep for ReplaceRegex {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> serde_json::Value {
        json!({ "pattern": self.pattern, "replacement": self.replacement })
    }

    fn format(&self, input: &str, _file: &Path) -> anyhow::Result<Option<String>> {
        let output = self.regex.replace_all(input, self.replacement.as_str());
        Ok(changed(input, output.into_owned()))
    }
}

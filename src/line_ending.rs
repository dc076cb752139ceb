//! Line-ending policy applied at the file boundary.
//!
//! Steps only ever see unix (`\n`) text. Raw content is converted with
//! [`to_unix`] when it is read, and the policy decides which newline sequence
//! is written back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const UNIX: &str = "\n";
const WINDOWS: &str = "\r\n";

#[cfg(windows)]
const PLATFORM_NATIVE: &str = WINDOWS;
#[cfg(not(windows))]
const PLATFORM_NATIVE: &str = UNIX;

/// Line endings written by the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LineEnding {
    /// `\n`
    #[default]
    Unix,
    /// `\r\n`
    Windows,
    /// `\r\n` on windows, `\n` everywhere else
    PlatformNative,
    /// Whatever the existing file already uses (first line break wins)
    Preserve,
}

impl LineEnding {
    /// Newline sequence to use for a file whose current content is `original`
    #[must_use]
    pub fn ending_for(self, original: &str) -> &'static str {
        match self {
            LineEnding::Unix => UNIX,
            LineEnding::Windows => WINDOWS,
            LineEnding::PlatformNative => PLATFORM_NATIVE,
            LineEnding::Preserve => detect(original),
        }
    }

    /// Convert unix text to the ending this policy selects for `original`
    #[must_use]
    pub fn apply(self, unix: &str, original: &str) -> String {
        let ending = self.ending_for(original);
        if ending == UNIX {
            unix.to_string()
        } else {
            unix.replace('\n', ending)
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineEnding::Unix => "unix",
            LineEnding::Windows => "windows",
            LineEnding::PlatformNative => "platform-native",
            LineEnding::Preserve => "preserve",
        };
        f.write_str(name)
    }
}

impl FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unix" | "lf" => Ok(LineEnding::Unix),
            "windows" | "crlf" => Ok(LineEnding::Windows),
            "platform-native" | "native" => Ok(LineEnding::PlatformNative),
            "preserve" => Ok(LineEnding::Preserve),
            other => Err(format!(
                "unknown line ending '{other}' (expected unix, windows, platform-native or preserve)"
            )),
        }
    }
}

impl TryFrom<String> for LineEnding {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LineEnding> for String {
    fn from(line_ending: LineEnding) -> Self {
        line_ending.to_string()
    }
}

/// Ending used by the first line break of `text`, `\n` when there is none
fn detect(text: &str) -> &'static str {
    match text.find('\n') {
        Some(idx) if idx > 0 && text.as_bytes()[idx - 1] == b'\r' => WINDOWS,
        _ => UNIX,
    }
}

/// Return `input` with exclusively unix line endings.
///
/// Text without any `\n` is returned as is; otherwise every `\r` is dropped.
#[must_use]
pub fn to_unix(input: &str) -> String {
    if input.contains('\n') {
        input.replace('\r', "")
    } else {
        input.to_string()
    }
}

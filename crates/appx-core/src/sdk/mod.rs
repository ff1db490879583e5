//! Windows SDK packaging tools.
//!
//! The tools themselves are opaque: this module builds their inputs (file
//! mappings, argument vectors), runs them, and turns their line-oriented
//! output into progress and structured errors.

mod file_list;
mod makeappx;
mod process;

use std::io;

use thiserror::Error;

pub use file_list::PackageFileList;
pub use makeappx::{MAKE_APPX_TOOL, MakeAppx, PackOptions, PackProgress, PackSource, Progress};
pub use process::{ToolOutput, ToolRunner};

#[derive(Error, Debug)]
pub enum SdkError {
    /// The tool reported an error in a recognized format.
    #[error("{tool} returned exit code {exit_code}{}. {message}", due_to(.code))]
    Tool {
        tool: String,
        exit_code: i32,
        /// Error code as printed by the tool, such as `0x80080204`.
        code: Option<String>,
        message: String,
    },

    /// The tool failed without a recognizable error line.
    #[error("{tool} failed with exit code {}", exit_code_text(.exit_code))]
    ProcessFailure {
        tool: String,
        /// `None` if the process was terminated by a signal.
        exit_code: Option<i32>,
        stdout: Vec<String>,
        stderr: Vec<String>,
    },

    #[error("Could not find {0} in the SDK directory or on PATH")]
    ToolNotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Tool execution was cancelled")]
    Cancelled,
}

fn due_to(code: &Option<String>) -> String {
    code.as_ref()
        .map(|c| format!(" due to error {c}"))
        .unwrap_or_default()
}

fn exit_code_text(code: &Option<i32>) -> String {
    code.map_or_else(|| "<none>".to_string(), |c| c.to_string())
}

impl SdkError {
    /// Numeric value of [`SdkError::Tool`]'s code: decimal, or hex with a
    /// `0x` prefix.
    pub fn code_value(&self) -> Option<i64> {
        let Self::Tool { code: Some(code), .. } = self else {
            return None;
        };
        match code.strip_prefix("0x").or_else(|| code.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        }
    }
}

const ERROR_PREFIX: &str = "MakeAppx : error: ";
const ERROR_INFO_PREFIX: &str = "MakeAppx : error: Error info: error ";
const HRESULT_PREFIX: &str = "MakeAppx : error: 0x";
const MANIFEST_ERROR_PREFIX: &str = "MakeAppx : error: Manifest validation error: ";

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Split `<code><separator><message>` where the code is alphanumeric.
fn split_code<'l>(text: &'l str, separator: &str) -> Option<(&'l str, &'l str)> {
    let end = text
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let message = text[end..].strip_prefix(separator)?;
    Some((&text[..end], message.trim()))
}

fn classify_lines(tool: &str, lines: &[String], exit_code: i32) -> Option<SdkError> {
    let tool_error = |code: Option<&str>, message: &str| SdkError::Tool {
        tool: tool.to_string(),
        exit_code,
        code: code.map(str::to_string),
        message: message.to_string(),
    };

    if let Some(line) = lines.iter().find(|l| starts_with_ignore_case(l, ERROR_INFO_PREFIX)) {
        let rest = &line[ERROR_INFO_PREFIX.len()..];
        return Some(match split_code(rest, ": ") {
            Some((code, message)) => tool_error(Some(code), message),
            None => tool_error(None, rest.trim()),
        });
    }

    let line = lines.iter().find(|l| starts_with_ignore_case(l, HRESULT_PREFIX))?;
    let rest = &line[ERROR_PREFIX.len()..];
    let manifest_error = lines
        .iter()
        .find_map(|l| l.strip_prefix(MANIFEST_ERROR_PREFIX))
        .filter(|m| !m.is_empty());

    Some(match split_code(rest, " - ") {
        Some((code, message)) => tool_error(Some(code), manifest_error.unwrap_or(message)),
        None => tool_error(None, manifest_error.unwrap_or(rest.trim())),
    })
}

/// Turn a failed tool run into an error.
///
/// Standard error is searched for a recognized error line before standard
/// output. Without one, the result is [`SdkError::ProcessFailure`] carrying
/// everything the tool printed.
pub fn classify_tool_error(tool: &str, output: ToolOutput) -> SdkError {
    let exit_code = output.exit_code.unwrap_or(-1);
    classify_lines(tool, &output.stderr, exit_code)
        .or_else(|| classify_lines(tool, &output.stdout, exit_code))
        .unwrap_or_else(|| SdkError::ProcessFailure {
            tool: tool.to_string(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &[&str], stderr: &[&str]) -> ToolOutput {
        ToolOutput {
            exit_code: Some(1),
            stdout: stdout.iter().map(|s| (*s).to_string()).collect(),
            stderr: stderr.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_error_info_line() {
        let err = classify_tool_error(
            MAKE_APPX_TOOL,
            output(
                &[],
                &[
                    "Some noise",
                    "makeappx : error: Error info: error C00CE169: App manifest validation error: bad attribute.",
                ],
            ),
        );
        let SdkError::Tool { code, message, exit_code, .. } = &err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(code.as_deref(), Some("C00CE169"));
        assert_eq!(message, "App manifest validation error: bad attribute.");
        assert_eq!(*exit_code, 1);
        assert_eq!(
            err.to_string(),
            "MakeAppx.exe returned exit code 1 due to error C00CE169. App manifest validation error: bad attribute."
        );
    }

    #[test]
    fn test_hresult_line_with_manifest_detail() {
        let err = classify_tool_error(
            MAKE_APPX_TOOL,
            output(
                &[
                    "MakeAppx : error: Manifest validation error: Line 10, Column 4, Reason: missing Identity.",
                    "MakeAppx : error: 0x80080204 - The specified package format is not valid.",
                ],
                &[],
            ),
        );
        let SdkError::Tool { code, message, .. } = &err else {
            panic!("unexpected {err:?}");
        };
        assert_eq!(code.as_deref(), Some("0x80080204"));
        assert_eq!(message, "Line 10, Column 4, Reason: missing Identity.");
        assert_eq!(err.code_value(), Some(0x8008_0204));
    }

    #[test]
    fn test_hresult_line_without_detail() {
        let err = classify_tool_error(
            MAKE_APPX_TOOL,
            output(&["MakeAppx : error: 0x80070002 - The system cannot find the file specified."], &[]),
        );
        assert!(matches!(
            &err,
            SdkError::Tool { message, .. } if message == "The system cannot find the file specified."
        ));
    }

    #[test]
    fn test_stderr_wins_over_stdout() {
        let err = classify_tool_error(
            MAKE_APPX_TOOL,
            output(
                &["MakeAppx : error: 0x1 - from stdout"],
                &["MakeAppx : error: 0x2 - from stderr"],
            ),
        );
        assert!(matches!(&err, SdkError::Tool { message, .. } if message == "from stderr"));
    }

    #[test]
    fn test_unrecognized_output() {
        let err = classify_tool_error(MAKE_APPX_TOOL, output(&["something went wrong"], &["boom"]));
        let SdkError::ProcessFailure { exit_code, stdout, stderr, .. } = err else {
            panic!("expected a process failure");
        };
        assert_eq!(exit_code, Some(1));
        assert_eq!(stdout, ["something went wrong"]);
        assert_eq!(stderr, ["boom"]);
    }
}

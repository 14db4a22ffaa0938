//! Structured error records and the free-text error normalizer.
//!
//! Errors reach the user from several places: the classifier, the shader
//! compiler, runtime validation and plain exceptions. Whatever arrives as
//! unstructured text is funnelled through [`normalize`], which recognises a
//! handful of upstream dialects and emits [`StructuredError`]s with line numbers
//! relative to the user's own source.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "warning" => Severity::Warning,
            "info" => Severity::Info,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// A diagnostic pinned to a 1-based line of the user's shader source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    pub message: String,
    /// Always `>= 1`.
    pub line: u32,
    pub column: Option<u32>,
    pub severity: Severity,
    /// Byte offset into the user source, `0` when unknown.
    pub offset: u32,
    /// Byte length of the offending span, `0` when unknown.
    pub length: u32,
}

impl StructuredError {
    /// Creates an error-severity record; `line` is clamped to 1.
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line: line.max(1),
            column: None,
            severity: Severity::Error,
            offset: 0,
            length: 0,
        }
    }

    pub fn with_column(mut self, column: Option<u32>) -> Self {
        self.column = column;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_span(mut self, offset: u32, length: u32) -> Self {
        self.offset = offset;
        self.length = length;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}: {}: {}", self.line, column, self.severity, self.message),
            None => write!(f, "{}: {}: {}", self.line, self.severity, self.message),
        }
    }
}

/// Text containing any of these is never treated as a status line.
const ERROR_MARKERS: &[&str] = &[
    "[error]",
    "error:",
    "GPU Error",
    "compilation failed",
    "Invalid",
    "Expected",
];

/// Matched text containing any of these reports lines in composed-source space.
const COMPILATION_MARKERS: &[&str] = &["[error]", "[warning]", "compilation", "unresolved", "Invalid"];

/// Everything before the first of these is informational chatter.
const PREAMBLE_ANCHORS: &[&str] = &["error:", "Invalid", "compilation failed"];

static STATUS_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)compiled\s+and\s+executed\s+successfully",
        r"(?i)successfully",
        r"(?i)shader\s+compiled",
        r"(?i)compilation\s+successful",
        r"(?i)no\s+errors",
        r"(?i)detected\s+shader\s+type",
        r"(?i)initiali[sz]ing\s+(?:gpu|renderer|device)",
        r"(?i)^creating\s",
        r"(?i)^loaded\s",
        r"(?i)texture\s+provided",
        r"(?i)^shader\s+type:",
    ]
    .into_iter()
    .map(compile_pattern)
    .collect()
});

static LOOSE_LINE: LazyLock<Regex> = LazyLock::new(|| compile_pattern(r"(?i)line\s*[:\s]\s*(\d+)"));
static LINE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    compile_pattern(r"(?i)(?:at\s+)?line\s+\d+(?:,?\s*column\s+\d+)?[:\s]*")
});
static RANGE_SEVERITY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    compile_pattern(r"(?i)^\d+:\d+\s*-\s*(?:error|warning|info)\s*:\s*")
});
static ERROR_PREFIX: LazyLock<Regex> = LazyLock::new(|| compile_pattern(r"(?i)^error\s*:\s*"));

/// Location and message pulled out of one dialect match.
struct Extracted {
    line: u32,
    column: Option<u32>,
    severity: Severity,
    message: String,
}

/// One upstream error format: a pattern plus a way to read its captures.
struct Dialect {
    name: &'static str,
    pattern: Regex,
    extract: fn(&Captures<'_>) -> Option<Extracted>,
}

/// Tried in order; the first dialect producing any match wins.
static DIALECTS: LazyLock<Vec<Dialect>> = LazyLock::new(|| {
    vec![
        dialect(
            "bracketed",
            r"(?i)\[(error|warning|info)\]\s*L(\d+):(\d+)\s+(.+)",
            |caps| {
                Some(Extracted {
                    line: number(caps, 2)?,
                    column: number(caps, 3),
                    severity: Severity::from_label(caps.get(1)?.as_str()),
                    message: text(caps, 4)?,
                })
            },
        ),
        dialect("parser", r"(?i)(.+?)\.{1,2}\s*Line:(\d+)", |caps| {
            Some(Extracted {
                line: number(caps, 2)?,
                column: None,
                severity: Severity::Error,
                message: text(caps, 1)?,
            })
        }),
        dialect(
            "range-severity",
            r"(?i)(\d+):(\d+)\s*-\s*(error|warning|info)\s*:\s*(.+)",
            |caps| {
                Some(Extracted {
                    line: number(caps, 1)?,
                    column: number(caps, 2),
                    severity: Severity::from_label(caps.get(3)?.as_str()),
                    message: text(caps, 4)?,
                })
            },
        ),
        dialect(
            "error-at-line",
            r"(?i)error\s*:\s*(.+?)\s+at\s+line\s+(\d+)",
            |caps| {
                Some(Extracted {
                    line: number(caps, 2)?,
                    column: None,
                    severity: Severity::Error,
                    message: text(caps, 1)?,
                })
            },
        ),
        dialect(
            "at-line-column",
            r"(?i)at\s+line\s+(\d+)(?:,\s*column\s+(\d+))?\s*:\s*(.+)",
            |caps| {
                Some(Extracted {
                    line: number(caps, 1)?,
                    column: number(caps, 2),
                    severity: Severity::Error,
                    message: text(caps, 3)?,
                })
            },
        ),
        dialect("line-prefix", r"(?i)\bline\s+(\d+)\s*:\s*(.+)", |caps| {
            let message = text(caps, 2)?;
            if message.to_ascii_lowercase().contains("success") {
                return None;
            }
            Some(Extracted {
                line: number(caps, 1)?,
                column: None,
                severity: Severity::Error,
                message,
            })
        }),
        dialect("bare-number", r"(?m)^\s*(\d+)\s*:\s*(.+)", |caps| {
            Some(Extracted {
                line: number(caps, 1)?,
                column: None,
                severity: Severity::Error,
                message: text(caps, 2)?,
            })
        }),
    ]
});

fn compile_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in error pattern must compile")
}

fn dialect(
    name: &'static str,
    pattern: &str,
    extract: fn(&Captures<'_>) -> Option<Extracted>,
) -> Dialect {
    Dialect {
        name,
        pattern: compile_pattern(pattern),
        extract,
    }
}

/// Positive integer capture; `0` counts as absent.
fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?
        .as_str()
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
}

fn text(caps: &Captures<'_>, group: usize) -> Option<String> {
    let value = caps.get(group)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_status_line(text: &str) -> bool {
    if ERROR_MARKERS.iter().any(|marker| text.contains(marker)) {
        return false;
    }
    STATUS_LINES.iter().any(|pattern| pattern.is_match(text))
}

fn is_compilation_error(matched: &str) -> bool {
    COMPILATION_MARKERS.iter().any(|marker| matched.contains(marker))
}

/// Converts arbitrary error text into structured records.
///
/// `header_offset` is the number of injected header lines; it is subtracted
/// only from matches that look like compiler output. Total: any input yields a
/// (possibly empty) list.
pub fn normalize(raw: &str, header_offset: u32) -> Vec<StructuredError> {
    let text = raw.trim();
    if text.is_empty() || is_status_line(text) {
        return Vec::new();
    }

    for dialect in DIALECTS.iter() {
        let errors: Vec<StructuredError> = dialect
            .pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let matched = caps.get(0)?.as_str();
                let extracted = (dialect.extract)(&caps)?;
                let message = clean_error_message(&extracted.message);
                if message.is_empty() {
                    return None;
                }
                let line = if is_compilation_error(matched) {
                    extracted.line.saturating_sub(header_offset)
                } else {
                    extracted.line
                };
                Some(
                    StructuredError::new(message, line)
                        .with_column(extracted.column)
                        .with_severity(extracted.severity),
                )
            })
            .collect();

        if !errors.is_empty() {
            tracing::trace!(dialect = dialect.name, count = errors.len(), "normalized error text");
            return errors;
        }
    }

    if let Some(line) = LOOSE_LINE
        .captures_iter(text)
        .find_map(|caps| number(&caps, 1))
    {
        return vec![StructuredError::new(text, line.saturating_sub(header_offset))];
    }

    let cleaned = clean_error_message(text);
    let message = if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned
    };
    vec![StructuredError::new(message, 1)]
}

/// Strips informational preambles and redundant location prefixes.
pub fn clean_error_message(raw: &str) -> String {
    let mut text = raw;
    if let Some(start) = PREAMBLE_ANCHORS
        .iter()
        .filter_map(|anchor| text.find(anchor))
        .min()
    {
        text = &text[start..];
    }

    let text = LINE_REFERENCE.replace_all(text, "");
    let text = text.trim_start();
    let text = RANGE_SEVERITY_PREFIX.replace(text, "");
    let text = ERROR_PREFIX.replace(&text, "");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_compiler_errors_are_header_adjusted() {
        let errors = normalize("[error] L17:39 unresolved value 'x'", 13);
        assert_eq!(errors.len(), 1);
        let error = &errors[0];
        assert_eq!(error.line, 4);
        assert_eq!(error.column, Some(39));
        assert_eq!(error.severity, Severity::Error);
        assert!(error.message.contains("unresolved value"));
    }

    #[test]
    fn parser_errors_keep_their_line() {
        let errors = normalize("Expected ')' for argument list. Line:3", 13);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 3);
        assert_eq!(errors[0].message, "Expected ')' for argument list");
    }

    #[test]
    fn parser_errors_with_double_period() {
        let errors = normalize("Expected ';' after statement.. Line:6", 5);
        assert_eq!(errors[0].line, 6);
        assert_eq!(errors[0].message, "Expected ';' after statement");
    }

    #[test]
    fn status_lines_are_not_errors() {
        assert!(normalize("Shader compiled and executed successfully", 0).is_empty());
        assert!(normalize("Shader compiled and executed successfully", 13).is_empty());
        assert!(normalize("Detected shader type: fragment-only", 5).is_empty());
        assert!(normalize("No texture provided for iChannel0", 0).is_empty());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(normalize("", 0).is_empty());
        assert!(normalize("   \n  ", 13).is_empty());
    }

    #[test]
    fn unrecognised_text_becomes_line_one() {
        let errors = normalize("some unparseable text", 0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].message, "some unparseable text");
    }

    #[test]
    fn range_severity_dialect_reads_severity() {
        let errors = normalize("12:4 - warning: unused variable 'uv'", 5);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 12);
        assert_eq!(errors[0].column, Some(4));
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(errors[0].message, "unused variable 'uv'");
    }

    #[test]
    fn error_at_line_dialect() {
        let errors = normalize("error: expected expression at line 7", 5);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 7);
        assert_eq!(errors[0].message, "expected expression");
    }

    #[test]
    fn at_line_column_dialect_adjusts_compiler_wording() {
        let errors = normalize(
            "Shader compilation failed at line 20, column 4: unresolved identifier 'uv'",
            5,
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 15);
        assert_eq!(errors[0].column, Some(4));
        assert_eq!(errors[0].message, "unresolved identifier 'uv'");
    }

    #[test]
    fn line_prefix_dialect() {
        let errors = normalize("line 9: missing semicolon", 5);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 9);
        assert_eq!(errors[0].message, "missing semicolon");
    }

    #[test]
    fn winning_dialect_reports_every_line() {
        let errors = normalize(
            "[error] L20:1 unresolved value 'a'\n[error] L22:3 unresolved value 'b'",
            13,
        );
        let lines: Vec<u32> = errors.iter().map(|error| error.line).collect();
        assert_eq!(lines, vec![7, 9]);
    }

    #[test]
    fn adjusted_lines_never_drop_below_one() {
        let errors = normalize("[error] L3:1 unresolved value 'x'", 13);
        assert_eq!(errors[0].line, 1);
    }

    #[test]
    fn loose_line_reference_falls_back_to_full_text() {
        let errors = normalize("something broke near line 42 somewhere", 13);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 29);
        assert_eq!(errors[0].message, "something broke near line 42 somewhere");
    }

    #[test]
    fn clean_strips_location_prefixes() {
        assert_eq!(
            clean_error_message("error: at line 4, column 2: bad token"),
            "bad token"
        );
        assert_eq!(
            clean_error_message("3:1 - error: unknown type 'flaot'"),
            "unknown type 'flaot'"
        );
        assert_eq!(
            clean_error_message("Detected shader type: fragment-only\nInvalid binding"),
            "Invalid binding"
        );
    }

    #[test]
    fn structured_error_clamps_line() {
        assert_eq!(StructuredError::new("boom", 0).line, 1);
    }
}

use std::sync::OnceLock;

use regex::Regex;

use crate::document::{SourceDocument, Span};
use crate::error::ToolInvocationError;

// AIDEV-NOTE: Grammar must stay bit-compatible with essl_to_glsl output:
// <anything>:<line>:<column>: <category>: <message>
const DIAGNOSTIC_PATTERN: &str = r"^.*?:(\d+):(\d+): ([^:]*): (.*)$";
const QUOTED_TOKEN_PATTERN: &str = r"^'([^']*)'\s*:\s*(.*)$";
const PERMISSION_PATTERN: &str = r"(?i)permission denied";
const COMMENT_MARKER: &str = "####";

/// A tool diagnostic pinned to a document line, before span resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateDiagnostic {
    pub line_index: usize,
    pub category: String,
    pub token: String,
    pub description: String,
    pub line_span: Span,
}

fn diagnostic_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(DIAGNOSTIC_PATTERN).unwrap())
}

fn quoted_token_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(QUOTED_TOKEN_PATTERN).unwrap())
}

fn permission_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(PERMISSION_PATTERN).unwrap())
}

/// Turn raw tool output into diagnostics for `document`, in output order.
///
/// Fails only when the tool reported that it could not be executed.
pub fn parse_output(
    output: &str,
    document: &SourceDocument,
) -> Result<Vec<IntermediateDiagnostic>, ToolInvocationError> {
    let mut diagnostics = Vec::new();

    for line in output.lines() {
        if permission_regex().is_match(line) {
            return Err(ToolInvocationError::PermissionDenied {
                detail: line.trim().to_string(),
            });
        }

        if line.starts_with(COMMENT_MARKER) {
            continue;
        }

        if let Some(diagnostic) = parse_line(line, document) {
            diagnostics.push(diagnostic);
        }
    }

    Ok(diagnostics)
}

fn parse_line(line: &str, document: &SourceDocument) -> Option<IntermediateDiagnostic> {
    let Some(captures) = diagnostic_regex().captures(line) else {
        tracing::trace!(line, "ignoring unrecognized tool output");
        return None;
    };

    // 1-based on the wire; 0 or overflowing numbers can't name a line
    let line_number = captures[1].parse::<usize>().ok().filter(|n| *n > 0);
    let Some(line_index) = line_number.map(|n| n - 1) else {
        tracing::debug!(line, "dropping diagnostic with invalid line number");
        return None;
    };

    let Some(line_span) = document.line_span(line_index) else {
        tracing::debug!(
            line_index,
            line_count = document.line_count(),
            "dropping diagnostic outside the document"
        );
        return None;
    };

    let category = captures[3].trim().to_string();
    let message = &captures[4];

    // ANGLE reports "'<token>' : <description>"; prefer the quoted token
    let (token, description) = match quoted_token_regex().captures(message) {
        Some(quoted) => (quoted[1].trim().to_string(), quoted[2].to_string()),
        None => (category.clone(), message.to_string()),
    };

    Some(IntermediateDiagnostic {
        line_index,
        category,
        token,
        description,
        line_span,
    })
}

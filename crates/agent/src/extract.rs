//! Structured output extraction: pull one JSON object out of free-form
//! model text.
//!
//! [`extract_json`] never fails: it returns the first balanced `{...}` it can
//! find, or `{}` when there is none. [`parse_structured`] turns that into a
//! typed value and is where failures become [`WorkflowError`]s.

use localcoder_core::error::{WorkflowError, preview};
use serde::de::DeserializeOwned;

/// What [`extract_json`] returns when nothing usable was found.
pub const EMPTY_OBJECT: &str = "{}";

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Remove `<think>...</think>` reasoning blocks. An unclosed block at the
/// end of the text (truncated output) is removed too.
pub fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(end) => rest = &after_open[end + THINK_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Strip one leading and one trailing triple-backtick fence line.
fn strip_fences(text: &str) -> &str {
    let mut text = text.trim();
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(newline) => &text[newline + 1..],
            None => "",
        };
    }
    if let Some(stripped) = text.trim_end().strip_suffix("```") {
        text = stripped;
    }
    text.trim()
}

/// Byte index of the `}` closing the object that opens at `text[0]`.
fn find_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first complete JSON object from `raw`.
///
/// Tolerates a reasoning preamble, Markdown fences, trailing commentary,
/// and braces inside string values. Returns [`EMPTY_OBJECT`] when there is
/// no `{` or the object never closes.
pub fn extract_json(raw: &str) -> String {
    let text = strip_fences(raw);
    let Some(start) = text.find('{') else {
        return EMPTY_OBJECT.to_string();
    };
    let candidate = &text[start..];
    match find_object_end(candidate) {
        Some(end) => candidate[..=end].to_string(),
        None => EMPTY_OBJECT.to_string(),
    }
}

/// Extract and deserialize a `T` from model output.
///
/// `target` names what was expected ("plan", "review") for error messages.
/// An empty extraction is [`WorkflowError::EmptyOutput`]; a shape mismatch is
/// [`WorkflowError::InvalidStructuredOutput`] with a bounded preview.
pub fn parse_structured<T: DeserializeOwned>(
    raw: &str,
    target: &'static str,
) -> Result<T, WorkflowError> {
    let cleaned = strip_reasoning(raw);
    let json = extract_json(&cleaned);
    if json == EMPTY_OBJECT {
        return Err(WorkflowError::EmptyOutput {
            target,
            raw: preview(raw),
        });
    }
    serde_json::from_str(&json).map_err(|e| WorkflowError::invalid_output(target, e.to_string(), &json))
}

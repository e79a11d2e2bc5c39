//! Response Extractor
//!
//! The generation provider sometimes returns plain prose (an initialization,
//! loading or error message) instead of the requested structured payload,
//! sometimes wraps valid JSON in explanatory prose, and sometimes returns the
//! payload cleanly. This module classifies raw responses and recovers the
//! payload when one exists.
//!
//! The scanner is a small pure state machine (position, depth, in-string,
//! escape) over delimiter candidates; each candidate substring is validated
//! by actually parsing it.

use crate::error::PipelineError;
use serde_json::Value;

/// Transient-status vocabulary. A response (or the text immediately before a
/// delimiter candidate) matching one of these prefixes is treated as a
/// loading/progress message, not data.
const STATUS_PREFIXES: &[&str] = &[
    "initializ",
    "loading",
    "processing",
    "please wait",
    "warming up",
    "starting",
    "one moment",
    "model is loading",
];

/// How much text before a delimiter candidate is inspected for status
/// vocabulary.
const PRECEDING_WINDOW_CHARS: usize = 80;

/// Upper bound on raw-text excerpts embedded in error messages.
const EXCERPT_CHARS: usize = 200;

/// Classification of a raw provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Contains a recoverable structured payload.
    Structured,
    /// A transient loading/progress message; retryable.
    StatusMessage,
    /// Neither structured data nor a recognized status message.
    Unparseable,
}

/// Classify a raw response without recovering the payload.
pub fn classify(raw: &str) -> Classification {
    match extract(raw) {
        Ok(_) => Classification::Structured,
        Err(PipelineError::StatusMessage(_)) => Classification::StatusMessage,
        Err(_) => Classification::Unparseable,
    }
}

/// Recover the structured payload from a raw response.
///
/// Failures are classified: a recognized transient status message surfaces as
/// `PipelineError::StatusMessage` (retryable), anything else as
/// `PipelineError::MalformedOutput` carrying a bounded excerpt of the text.
pub fn extract(raw: &str) -> Result<Value, PipelineError> {
    let mut objects = Vec::new();
    let mut arrays = Vec::new();
    for (pos, ch) in raw.char_indices() {
        match ch {
            '{' => objects.push(pos),
            '[' => arrays.push(pos),
            _ => {}
        }
    }

    if objects.is_empty() && arrays.is_empty() {
        return Err(reject(raw));
    }

    // Deliberate tie-break: the expected payload shape is an object, so every
    // object candidate is tried before any array candidate.
    for pos in objects.into_iter().chain(arrays) {
        if window_has_status_vocab(&raw[..pos]) {
            continue;
        }
        let Some(span) = balanced_span(raw, pos) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }
    }

    Err(reject(raw))
}

fn reject(raw: &str) -> PipelineError {
    if is_status_text(raw) {
        PipelineError::StatusMessage(excerpt(raw))
    } else {
        PipelineError::MalformedOutput(excerpt(raw))
    }
}

/// Whether the text as a whole reads as a transient status message.
fn is_status_text(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    STATUS_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

/// Whether the trailing window of `preceding` contains status vocabulary.
fn window_has_status_vocab(preceding: &str) -> bool {
    let window: String = preceding
        .chars()
        .rev()
        .take(PRECEDING_WINDOW_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let lowered = window.to_lowercase();
    STATUS_PREFIXES
        .iter()
        .any(|prefix| lowered.contains(prefix))
}

/// Find the balanced substring starting at the delimiter at `start`.
///
/// Depth-aware scan respecting string literals and escape sequences. Returns
/// `None` when the delimiter never closes. Delimiter kinds are not matched
/// pairwise here; the subsequent parse rejects mismatches.
fn balanced_span(raw: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (pos, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + pos + ch.len_utf8();
                    return Some(&raw[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Bounded prefix of the raw text for diagnostics; never the full response.
fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", head)
    }
}

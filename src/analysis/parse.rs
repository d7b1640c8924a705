use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StocklensError;

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence pattern is valid")
});

static WHOLE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*```[\w-]*\s*(.*?)\s*```\s*\z").expect("whole fence pattern is valid")
});

static THINKING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?(?:</think>|\z)").expect("thinking pattern is valid")
});

static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("string literal pattern is valid")
});

/// Body of the first fenced code block, or the whole text trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    FENCED
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str())
        .trim()
}

/// Drop `<think>...</think>` blocks emitted by reasoning models.
pub fn strip_thinking(text: &str) -> String {
    THINKING.replace_all(text, "").trim().to_owned()
}

/// Free-text answer with thinking removed and, when the whole answer is a
/// single fenced block, the fence removed. Inner code blocks are kept.
pub fn text_body(text: &str) -> String {
    let text = strip_thinking(text);
    match WHOLE_FENCE.captures(&text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_owned(),
        None => text,
    }
}

/// Span from the first `{` to the last `}`.
fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Escape raw newlines, carriage returns and tabs inside JSON string
/// literals and drop any other control characters there.
pub fn sanitize_json_strings(json: &str) -> String {
    STRING_LITERAL
        .replace_all(json, |caps: &regex::Captures<'_>| {
            let mut out = String::with_capacity(caps[0].len());
            out.push('"');
            for ch in caps[1].chars() {
                match ch {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_control() => {}
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        })
        .into_owned()
}

/// Parse a JSON document out of a model's free-text answer.
///
/// Candidates, in order: the whole text, the first fenced block, and the
/// outermost `{...}` span once thinking blocks are removed. Each candidate is
/// tried as-is and again after sanitizing string literals. A failure here
/// belongs to the caller, never to the provider that produced the text.
pub fn parse_json_response<T: DeserializeOwned>(text: &str, context: &str) -> Result<T, StocklensError> {
    let thought_free = strip_thinking(text);
    let candidates = [
        Some(text.trim()),
        Some(strip_code_fence(&thought_free)),
        outer_object(&thought_free),
    ];

    let mut last_error = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str(candidate) {
            Ok(value) => return Ok(value),
            Err(first) => {
                debug!(context, error = %first, "JSON parse failed, sanitizing");
            }
        }
        match serde_json::from_str(&sanitize_json_strings(candidate)) {
            Ok(value) => return Ok(value),
            Err(second) => last_error = Some(second),
        }
    }

    Err(StocklensError::MalformedResponse {
        context: context.to_owned(),
        reason: last_error.map_or_else(|| "empty response".to_owned(), |e| e.to_string()),
    })
}

//! Response normalization for the zai upstream
//!
//! zai speaks the Anthropic wire format except for thinking blocks: the
//! reasoning arrives nested under a `thinking` sub-field (string or object)
//! instead of a flat `content` string, and some models leak `<thinking>`
//! tags into plain-string content instead of emitting blocks at all. Both
//! shapes confuse clients expecting the reference format, so JSON response
//! bodies from zai are rewritten before they reach the client.
//!
//! Fail-safe like the request-side sanitizer: bodies that do not parse pass
//! through untouched, and an unchanged body is returned as `None` so the
//! caller keeps the original bytes.

use bytes::Bytes;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// Closed `<thinking …>…</thinking>` spans, with surrounding whitespace.
static THINKING_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\s*<thinking\b[^>]*>.*?</thinking>\s*").expect("static regex")
});

/// An unterminated `<thinking …>` tail running to end of string.
static THINKING_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\s*<thinking\b[^>]*>.*\z").expect("static regex"));

/// Rewrite a zai JSON response body into the reference thinking shape.
///
/// Returns `Some(bytes)` only when the body actually changed; `None` means
/// the caller should forward the original bytes (unparseable bodies
/// included).
pub fn transform_thinking_blocks(body: &[u8]) -> Option<Bytes> {
    let Ok(mut root) = serde_json::from_slice::<Value>(body) else {
        return None;
    };

    let changed = match root.get_mut("content") {
        Some(Value::Array(blocks)) => rewrite_blocks(blocks),
        Some(Value::String(text)) => match strip_thinking_tags(text) {
            Some(stripped) => {
                *text = stripped;
                true
            }
            None => false,
        },
        _ => false,
    };

    if !changed {
        return None;
    }
    serde_json::to_vec(&root).ok().map(Bytes::from)
}

fn rewrite_blocks(blocks: &mut [Value]) -> bool {
    let mut changed = false;
    for block in blocks.iter_mut() {
        if block.get("type").and_then(Value::as_str) != Some("thinking") {
            continue;
        }
        let rebuilt = json!({
            "type": "thinking",
            "content": response_extract(block),
        });
        if *block != rebuilt {
            *block = rebuilt;
            changed = true;
        }
    }
    changed
}

/// Reasoning text of a zai thinking block. Precedence: flat `content`
/// string, flat `thinking` string, nested `thinking.content` /
/// `thinking.thinking` / `thinking.text` strings, then the JSON
/// serialization of the nested value, then the empty string.
fn response_extract(block: &Value) -> String {
    if let Some(s) = block.get("content").and_then(Value::as_str) {
        return s.to_string();
    }
    if let Some(s) = block.get("thinking").and_then(Value::as_str) {
        return s.to_string();
    }
    if let Some(nested) = block.get("thinking") {
        for key in ["content", "thinking", "text"] {
            if let Some(s) = nested.get(key).and_then(Value::as_str) {
                return s.to_string();
            }
        }
        if !nested.is_null() {
            return nested.to_string();
        }
    }
    String::new()
}

/// Strip `<thinking>` spans out of plain-string content. Returns `None`
/// when nothing was stripped.
fn strip_thinking_tags(text: &str) -> Option<String> {
    // Fast path: most bodies carry no tags at all.
    if !text.to_ascii_lowercase().contains("<thinking") {
        return None;
    }
    let without_spans = THINKING_SPAN.replace_all(text, "");
    let without_tail = THINKING_TAIL.replace(&without_spans, "");
    let trimmed = without_tail.trim();
    if trimmed == text {
        None
    } else {
        Some(trimmed.to_string())
    }
}

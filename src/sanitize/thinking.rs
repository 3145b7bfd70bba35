//! Thinking-block shape helpers
//!
//! Thinking blocks arrive in two dialects. Anthropic's carries the reasoning
//! in a `content` string plus a verifiable `signature`. The GLM dialect nests
//! it under a `thinking` sub-field, which may itself be a string or an object
//! with some of `content`/`thinking`/`text`/`signature`. These helpers pull a
//! best-effort reasoning string out of either shape and build the replacement
//! blocks the sanitizer emits.

use serde_json::{json, Value};

/// Marker wrapped around converted GLM reasoning so the model can tell it
/// apart from ordinary prose on later turns.
const REASONING_TAG_OPEN: &str = "<previous-glm-reasoning>";
const REASONING_TAG_CLOSE: &str = "</previous-glm-reasoning>";

/// Whether the block carries a GLM-dialect `thinking` sub-field.
pub(super) fn has_thinking_subfield(block: &Value) -> bool {
    matches!(
        block.get("thinking"),
        Some(Value::String(_)) | Some(Value::Object(_))
    )
}

/// Non-empty `signature` string, if present.
pub(super) fn signature_of(block: &Value) -> Option<&str> {
    block
        .get("signature")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Pull the reasoning text out of a thinking block of unknown dialect.
///
/// Precedence: `thinking` (string), `content` (string), then the nested
/// `thinking.content` / `thinking.thinking` / `thinking.text` strings, then
/// `content.text`, and finally the JSON serialization of whatever nested
/// value is there.
pub(super) fn reasoning_extract(block: &Value) -> String {
    if let Some(s) = block.get("thinking").and_then(Value::as_str) {
        return s.to_string();
    }
    if let Some(s) = block.get("content").and_then(Value::as_str) {
        return s.to_string();
    }
    if let Some(nested) = block.get("thinking") {
        for key in ["content", "thinking", "text"] {
            if let Some(s) = nested.get(key).and_then(Value::as_str) {
                return s.to_string();
            }
        }
    }
    if let Some(s) = block
        .get("content")
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
    {
        return s.to_string();
    }
    match (block.get("thinking"), block.get("content")) {
        (Some(nested), _) if !nested.is_null() => nested.to_string(),
        (_, Some(nested)) if !nested.is_null() => nested.to_string(),
        _ => String::new(),
    }
}

/// Extract a reasoning string from a bare `thinking` sub-field value.
pub(super) fn subfield_extract(value: &Value) -> String {
    if let Some(s) = value.as_str() {
        return s.to_string();
    }
    for key in ["content", "thinking", "text"] {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            return s.to_string();
        }
    }
    value.to_string()
}

/// Replacement text block for a thinking block whose origin is not anthropic.
pub(super) fn glm_text_block(block: &Value) -> Value {
    let extract = reasoning_extract(block);
    json!({
        "type": "text",
        "text": format!("{REASONING_TAG_OPEN}\n{extract}\n{REASONING_TAG_CLOSE}"),
    })
}

/// Legacy normalization: rebuild a thinking block in the anthropic shape
/// without consulting a signature store.
///
/// Only `content` and `cache_control` survive from the original; a GLM
/// `thinking` sub-field always wins over any pre-existing `content`; the
/// `signature` and `thinking` fields are dropped and `content` is defaulted
/// to the empty string.
pub(super) fn normalized_thinking_block(block: &Value) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("type".to_string(), json!("thinking"));

    if let Some(content) = block.get("content") {
        out.insert("content".to_string(), content.clone());
    }
    if let Some(cache_control) = block.get("cache_control") {
        out.insert("cache_control".to_string(), cache_control.clone());
    }

    if has_thinking_subfield(block) {
        // "Always use latest": the sub-field's reasoning supersedes whatever
        // content was already on the block.
        let extract = subfield_extract(&block["thinking"]);
        out.insert("content".to_string(), json!(extract));
    }

    out.entry("content".to_string()).or_insert_with(|| json!(""));

    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_prefers_thinking_string() {
        let block = json!({"type": "thinking", "thinking": "from-sub", "content": "from-content"});
        assert_eq!(reasoning_extract(&block), "from-sub");
    }

    #[test]
    fn extract_falls_back_to_content_string() {
        let block = json!({"type": "thinking", "content": "from-content"});
        assert_eq!(reasoning_extract(&block), "from-content");
    }

    #[test]
    fn extract_reads_nested_thinking_fields() {
        let block = json!({"type": "thinking", "thinking": {"thinking": "nested"}});
        assert_eq!(reasoning_extract(&block), "nested");

        let block = json!({"type": "thinking", "thinking": {"text": "t"}});
        assert_eq!(reasoning_extract(&block), "t");
    }

    #[test]
    fn extract_serializes_opaque_nested_object() {
        let block = json!({"type": "thinking", "thinking": {"tokens": 42}});
        assert_eq!(reasoning_extract(&block), r#"{"tokens":42}"#);
    }

    #[test]
    fn extract_empty_for_bare_block() {
        let block = json!({"type": "thinking"});
        assert_eq!(reasoning_extract(&block), "");
    }

    #[test]
    fn glm_text_block_wraps_with_marker_tags() {
        let block = json!({"type": "thinking", "thinking": "X"});
        let text = glm_text_block(&block);
        assert_eq!(
            text["text"].as_str().unwrap(),
            "<previous-glm-reasoning>\nX\n</previous-glm-reasoning>"
        );
        assert_eq!(text["type"], "text");
    }

    #[test]
    fn normalized_block_drops_signature_and_subfield() {
        let block = json!({
            "type": "thinking",
            "thinking": "latest",
            "content": "stale",
            "signature": "zs",
            "extra": true,
        });
        let out = normalized_thinking_block(&block);
        assert_eq!(out["content"], "latest");
        assert!(out.get("signature").is_none());
        assert!(out.get("thinking").is_none());
        assert!(out.get("extra").is_none());
    }

    #[test]
    fn normalized_block_keeps_cache_control_and_defaults_content() {
        let block = json!({"type": "thinking", "cache_control": {"type": "ephemeral"}});
        let out = normalized_thinking_block(&block);
        assert_eq!(out["content"], "");
        assert_eq!(out["cache_control"]["type"], "ephemeral");
    }
}

//! Message-sequence repair
//!
//! Upstream anthropic rejects conversations that do not start with a user
//! message, contain consecutive same-role messages, contain empty messages,
//! or echo a `tool_result` with no matching `tool_use` in the immediately
//! preceding assistant turn. Client-side history editing (and our own
//! thinking-block conversions) can produce all four, so the sanitizer runs
//! these repairs after the per-block pass.

use serde_json::{json, Value};
use std::collections::HashSet;

/// Bound on the fix-point iteration. Each pass strictly shrinks or merges,
/// so real inputs converge in one or two passes.
const MAX_REPAIR_PASSES: usize = 10;

fn role_of(message: &Value) -> Option<&str> {
    message.get("role").and_then(Value::as_str)
}

fn is_empty_content(message: &Value) -> bool {
    match message.get("content") {
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        _ => false,
    }
}

/// Coerce message content into a block array for merging. A bare string
/// becomes a single text block.
fn content_blocks(message: &Value) -> Vec<Value> {
    match message.get("content") {
        Some(Value::Array(a)) => a.clone(),
        Some(Value::String(s)) => vec![json!({"type": "text", "text": s})],
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn merge_into(first: &mut Value, second: &Value) {
    let joined = match (first.get("content"), second.get("content")) {
        (Some(Value::String(a)), Some(Value::String(b))) => {
            Value::String(format!("{}\n\n{}", a, b))
        }
        _ => {
            let mut blocks = content_blocks(first);
            blocks.extend(content_blocks(second));
            Value::Array(blocks)
        }
    };
    first["content"] = joined;
}

/// Iteratively repair the message sequence until stable: drop the leading
/// non-user prefix, merge consecutive same-role messages, drop empty
/// messages. Returns whether anything changed.
pub(super) fn repair_structure(messages: &mut Vec<Value>) -> bool {
    let mut changed_any = false;

    for _ in 0..MAX_REPAIR_PASSES {
        let mut changed = false;

        // Leading non-user prefix. Dropping here may orphan a tool_result
        // further down, which is why orphan repair runs after this.
        while let Some(first) = messages.first() {
            if role_of(first) == Some("user") {
                break;
            }
            messages.remove(0);
            changed = true;
        }

        // Consecutive same-role merge.
        let mut i = 1;
        while i < messages.len() {
            let same_role = match (role_of(&messages[i - 1]), role_of(&messages[i])) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if same_role {
                let second = messages.remove(i);
                merge_into(&mut messages[i - 1], &second);
                changed = true;
            } else {
                i += 1;
            }
        }

        // Empty-content drop.
        let before = messages.len();
        messages.retain(|m| !is_empty_content(m));
        if messages.len() != before {
            changed = true;
        }

        if !changed {
            break;
        }
        changed_any = true;
    }

    changed_any
}

/// Textual payload of a tool_result block: its `content` string, or the
/// concatenated `text` of its nested text blocks.
fn tool_result_text(block: &Value) -> Option<String> {
    match block.get("content") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(blocks)) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Collect `tool_use` ids from an assistant message's content array.
fn tool_use_ids(message: &Value) -> HashSet<String> {
    let mut ids = HashSet::new();
    if role_of(message) != Some("assistant") {
        return ids;
    }
    let Some(blocks) = message.get("content").and_then(Value::as_array) else {
        return ids;
    };
    for block in blocks {
        if block.get("type").and_then(Value::as_str) == Some("tool_use") {
            if let Some(id) = block.get("id").and_then(Value::as_str) {
                ids.insert(id.to_string());
            }
        }
    }
    ids
}

/// Convert orphaned tool_result blocks, those whose `tool_use_id` has no
/// matching `tool_use` in the immediately preceding assistant message, into
/// plain text blocks anthropic will accept. Returns whether anything changed.
pub(super) fn repair_orphan_tool_results(messages: &mut [Value]) -> bool {
    let mut changed = false;

    for i in 0..messages.len() {
        if role_of(&messages[i]) != Some("user") {
            continue;
        }
        let has_tool_result = messages[i]
            .get("content")
            .and_then(Value::as_array)
            .is_some_and(|blocks| {
                blocks
                    .iter()
                    .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
            });
        if !has_tool_result {
            continue;
        }

        let known_ids = if i > 0 {
            tool_use_ids(&messages[i - 1])
        } else {
            HashSet::new()
        };

        let Some(blocks) = messages[i].get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        for block in blocks.iter_mut() {
            if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                continue;
            }
            let matched = block
                .get("tool_use_id")
                .and_then(Value::as_str)
                .is_some_and(|id| known_ids.contains(id));
            if matched {
                continue;
            }

            let text = match tool_result_text(block) {
                Some(t) if !t.is_empty() => format!("[previous tool result]\n{}", t),
                _ => "[previous tool result]".to_string(),
            };
            *block = json!({"type": "text", "text": text});
            changed = true;
        }
    }

    changed
}

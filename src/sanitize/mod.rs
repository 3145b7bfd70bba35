//! Request sanitization for the anthropic upstream
//!
//! Conversation histories echoed back by the client may contain thinking
//! blocks that originated from the zai upstream on earlier turns. Anthropic
//! verifies the `signature` on any thinking block it is sent, so zai-shaped
//! blocks must be converted to plain text before forwarding, while genuine
//! anthropic blocks must pass through byte-identical or verification fails.
//!
//! Origin is decided against the signature store populated from anthropic
//! responses. Everything here is fail-safe: a body that does not parse, or
//! that parses to something unexpected, is returned unchanged. When nothing
//! needed fixing the original bytes are returned byte-identical.

mod structure;
mod thinking;

use crate::signatures::SignatureStore;
use bytes::Bytes;
use serde_json::Value;

enum ThinkingPolicy<'a> {
    /// Production path: keep anthropic-origin blocks verbatim, convert the
    /// rest to tagged text.
    StoreAware(&'a SignatureStore),
    /// Legacy path for callers without a store: normalize every thinking
    /// block into the anthropic shape.
    Normalize,
}

/// Record the signatures of all thinking blocks in an anthropic response
/// body. The body itself is never modified; malformed JSON is a no-op.
pub fn extract_and_record_signatures(body: &[u8], store: &SignatureStore) {
    let Ok(root) = serde_json::from_slice::<Value>(body) else {
        return;
    };
    let Some(blocks) = root.get("content").and_then(Value::as_array) else {
        return;
    };
    for block in blocks {
        if block.get("type").and_then(Value::as_str) != Some("thinking") {
            continue;
        }
        if let Some(signature) = thinking::signature_of(block) {
            store.add(signature);
        }
    }
}

/// Sanitize a client request body for the anthropic upstream.
///
/// Thinking blocks are classified by origin against the store; zai-origin
/// blocks become tagged text; the message sequence is then repaired
/// (leading role, alternation, empties, orphaned tool results). Returns the
/// original bytes unchanged when nothing needed fixing or the body is not a
/// messages request.
pub fn sanitize_request(body: &Bytes, store: &SignatureStore) -> Bytes {
    sanitize_with_policy(body, &ThinkingPolicy::StoreAware(store))
}

/// Legacy store-less sanitizer: every thinking block is rewritten into the
/// anthropic shape instead of being origin-classified.
pub fn sanitize_request_no_store(body: &Bytes) -> Bytes {
    sanitize_with_policy(body, &ThinkingPolicy::Normalize)
}

fn sanitize_with_policy(body: &Bytes, policy: &ThinkingPolicy) -> Bytes {
    let Ok(mut root) = serde_json::from_slice::<Value>(body) else {
        return body.clone();
    };
    let Some(messages) = root.get_mut("messages").and_then(Value::as_array_mut) else {
        return body.clone();
    };

    let mut changed = false;
    for message in messages.iter_mut() {
        changed |= sanitize_message(message, policy);
    }

    // Structure repair must run before orphan detection: dropping a leading
    // assistant message can orphan a tool_result further down.
    changed |= structure::repair_structure(messages);
    changed |= structure::repair_orphan_tool_results(messages);

    if !changed {
        return body.clone();
    }
    match serde_json::to_vec(&root) {
        Ok(serialized) => Bytes::from(serialized),
        Err(_) => body.clone(),
    }
}

fn sanitize_message(message: &mut Value, policy: &ThinkingPolicy) -> bool {
    // String content is left alone; only block arrays are walked.
    let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) else {
        return false;
    };
    sanitize_blocks(blocks, policy)
}

fn sanitize_blocks(blocks: &mut [Value], policy: &ThinkingPolicy) -> bool {
    let mut changed = false;
    for block in blocks.iter_mut() {
        match block.get("type").and_then(Value::as_str) {
            Some("thinking") => changed |= sanitize_thinking_block(block, policy),
            Some("tool_result") => {
                // tool_result content can itself be a block array.
                if let Some(nested) = block.get_mut("content").and_then(Value::as_array_mut) {
                    changed |= sanitize_blocks(nested, policy);
                }
            }
            _ => {}
        }
    }
    changed
}

fn sanitize_thinking_block(block: &mut Value, policy: &ThinkingPolicy) -> bool {
    match policy {
        ThinkingPolicy::StoreAware(store) => {
            // Origin detection, in order:
            // 1. Signature we have seen from anthropic: keep verbatim so
            //    anthropic can verify it.
            // 2. A `thinking` sub-field marks the zai dialect: convert.
            // 3. Unrecognized but present signature: keep verbatim. Covers
            //    anthropic-origin blocks from before a proxy restart, whose
            //    signatures the store never saw.
            // 4. No evidence of anthropic origin: convert.
            if let Some(signature) = thinking::signature_of(block) {
                if store.has(signature) {
                    return false;
                }
                if !thinking::has_thinking_subfield(block) {
                    return false;
                }
            }
            *block = thinking::glm_text_block(block);
            true
        }
        ThinkingPolicy::Normalize => {
            let normalized = thinking::normalized_thinking_block(block);
            if *block == normalized {
                false
            } else {
                *block = normalized;
                true
            }
        }
    }
}

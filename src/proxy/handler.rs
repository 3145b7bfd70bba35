//! Per-request proxy pipeline
//!
//! One handler drives a request end to end: buffer the body under the
//! request cap, pick the upstream from the `model` field, rewrite the model
//! and sanitize the history when needed, forward with rewritten headers,
//! then either stream the response straight through or buffer it for
//! thinking-block normalization / signature capture.
//!
//! Cancellation rides on future drop: when the client goes away axum drops
//! this future, which drops the in-flight reqwest request and its socket.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, Request, Response},
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::error::ProxyError;
use super::headers::{build_forward_headers, filter_response_headers};
use super::ProxyState;
use crate::config::UpstreamName;
use crate::{sanitize, transform};

/// Inbound request body cap.
pub(crate) const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Response buffering cap when a body must be rewritten or inspected.
pub(crate) const MAX_TRANSFORM_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Upstream dispatch-to-response deadline.
pub(crate) const UPSTREAM_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Cap on response-body excerpts in warn logs.
const LOG_EXCERPT_BYTES: usize = 500;

/// Main proxy handler - routes, rewrites, and forwards one request.
pub(crate) async fn proxy_handler(
    State(state): State<ProxyState>,
    req: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let start = Instant::now();
    let req_id = next_request_id();

    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let uri = parts.uri.clone();
    let inbound_headers = parts.headers;

    tracing::debug!(component = "proxy", req_id = %req_id, method = %method, path = %uri.path(), "Request received");

    // GET/HEAD and friends skip buffering unless the client signals a body.
    let body_bytes = if expects_body(&method, &inbound_headers) {
        read_request_body(body).await?
    } else {
        Bytes::new()
    };

    // Best-effort model extraction; an unparseable body routes like a
    // request without a model.
    let model = serde_json::from_slice::<serde_json::Value>(&body_bytes)
        .ok()
        .as_ref()
        .and_then(|v| v.get("model"))
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    let model_label = model.clone().unwrap_or_else(|| "no-model".to_string());

    let route = state.routes.select(model.as_deref());

    let mut forward_body = body_bytes;
    let mut body_rewritten = false;

    // Outbound model rename from the winning rule.
    if let Some(rename) = route.model.as_deref() {
        if let Ok(mut parsed) = serde_json::from_slice::<serde_json::Value>(&forward_body) {
            if let Some(object) = parsed.as_object_mut() {
                object.insert("model".to_string(), serde_json::json!(rename));
                if let Ok(serialized) = serde_json::to_vec(&parsed) {
                    forward_body = Bytes::from(serialized);
                    body_rewritten = true;
                }
            }
        }
    }

    // Histories bound for anthropic must not carry zai-shaped thinking
    // blocks or broken message structure.
    if route.name == UpstreamName::Anthropic
        && is_json_content_type(inbound_headers.get(header::CONTENT_TYPE))
    {
        let sanitized = sanitize::sanitize_request(&forward_body, &state.signatures);
        if sanitized != forward_body {
            forward_body = sanitized;
            body_rewritten = true;
        }
    }

    let url = upstream_url(&route.url, &uri);
    let forward_headers = build_forward_headers(
        &inbound_headers,
        &route,
        body_rewritten.then_some(forward_body.len()),
    );

    tracing::debug!(
        component = "proxy",
        req_id = %req_id,
        model = %model_label,
        upstream = %route.name,
        body_rewritten,
        "Forwarding to {}",
        url
    );

    let dispatch = state
        .client
        .request(method.clone(), url.as_str())
        .headers(forward_headers)
        .body(forward_body)
        .send();

    let response = match tokio::time::timeout(UPSTREAM_TIMEOUT, dispatch).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) if e.is_timeout() => {
            return Err(ProxyError::GatewayTimeout(format!(
                "upstream {} timed out: {}",
                route.name, e
            )))
        }
        Ok(Err(e)) => {
            return Err(ProxyError::Upstream(format!(
                "upstream {} request failed: {}",
                route.name, e
            )))
        }
        Err(_) => {
            return Err(ProxyError::GatewayTimeout(format!(
                "upstream {} did not respond within {}s",
                route.name,
                UPSTREAM_TIMEOUT.as_secs()
            )))
        }
    };

    let status = response.status();
    let response_headers = response.headers().clone();
    let json_response = is_json_content_type(response_headers.get(header::CONTENT_TYPE));
    let need_transform = route.name == UpstreamName::Zai && json_response;
    let need_signature_extract = route.name == UpstreamName::Anthropic && json_response;

    if need_transform || need_signature_extract {
        // BUFFERED PATH: the body must be inspected or rewritten whole.
        let raw = match tokio::time::timeout(
            UPSTREAM_TIMEOUT,
            read_response_body(response, &route.name),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProxyError::GatewayTimeout(format!(
                    "upstream {} response body stalled past {}s",
                    route.name,
                    UPSTREAM_TIMEOUT.as_secs()
                )))
            }
        };

        let relay_body = if need_signature_extract {
            sanitize::extract_and_record_signatures(&raw, &state.signatures);
            raw
        } else {
            transform::transform_thinking_blocks(&raw).unwrap_or(raw)
        };

        log_response(
            &req_id,
            &method,
            uri.path(),
            &model_label,
            route.name,
            status.as_u16(),
            start,
            Some(&relay_body),
        );

        let mut out = Response::builder()
            .status(status)
            .body(Body::from(relay_body.clone()))
            .map_err(|e| ProxyError::Upstream(format!("failed to build response: {}", e)))?;
        *out.headers_mut() = filter_response_headers(&response_headers, Some(relay_body.len()));
        Ok(out)
    } else {
        // STREAMING PATH: relay chunks as they arrive, preserving SSE and
        // chunked semantics.
        log_response(
            &req_id,
            &method,
            uri.path(),
            &model_label,
            route.name,
            status.as_u16(),
            start,
            None,
        );

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let mut out = Response::builder()
            .status(status)
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::Upstream(format!("failed to build response: {}", e)))?;
        *out.headers_mut() = filter_response_headers(&response_headers, None);
        Ok(out)
    }
}

/// Whether the request is expected to carry a body worth buffering.
fn expects_body(method: &Method, headers: &HeaderMap) -> bool {
    if [Method::POST, Method::PUT, Method::PATCH].contains(method) {
        return true;
    }
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    if declared_len.is_some_and(|n| n > 0) {
        return true;
    }
    headers.contains_key(header::TRANSFER_ENCODING)
}

/// Buffer the inbound body under the request cap.
async fn read_request_body(body: Body) -> Result<Bytes, ProxyError> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ProxyError::Upstream(format!("failed to read request body: {}", e)))?;
        if buffer.len() + chunk.len() > MAX_REQUEST_BODY_BYTES {
            return Err(ProxyError::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                MAX_REQUEST_BODY_BYTES
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Buffer an upstream response body under the transform cap.
async fn read_response_body(
    response: reqwest::Response,
    upstream: &UpstreamName,
) -> Result<Bytes, ProxyError> {
    let mut stream = response.bytes_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            ProxyError::Upstream(format!("failed to read {} response body: {}", upstream, e))
        })?;
        if buffer.len() + chunk.len() > MAX_TRANSFORM_BODY_BYTES {
            return Err(ProxyError::Transform(format!(
                "{} response body exceeds {} bytes",
                upstream, MAX_TRANSFORM_BODY_BYTES
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Resolve the outbound URL: upstream base path (trailing slash stripped)
/// plus the inbound path and query.
fn upstream_url(base: &str, uri: &axum::http::Uri) -> String {
    let base = base.trim_end_matches('/');
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}{}", base, path_and_query)
}

/// One line per response: warn with a body excerpt for 4xx/5xx, info
/// otherwise.
#[allow(clippy::too_many_arguments)]
fn log_response(
    req_id: &str,
    method: &Method,
    path: &str,
    model: &str,
    upstream: UpstreamName,
    status: u16,
    start: Instant,
    body: Option<&Bytes>,
) {
    let duration_ms = start.elapsed().as_millis() as u64;
    if status >= 400 {
        let excerpt = body.map(body_excerpt).unwrap_or_default();
        tracing::warn!(
            component = "proxy",
            req_id = %req_id,
            method = %method,
            path = %path,
            model = %model,
            upstream = %upstream,
            status,
            duration_ms,
            body_excerpt = %excerpt,
            "Upstream error response"
        );
    } else {
        tracing::info!(
            component = "proxy",
            req_id = %req_id,
            method = %method,
            path = %path,
            model = %model,
            upstream = %upstream,
            status,
            duration_ms,
            "Upstream response"
        );
    }
}

/// Excerpt of an error-response body for the warn log: lossy UTF-8, capped
/// at [`LOG_EXCERPT_BYTES`] without cutting through a multi-byte character.
fn body_excerpt(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= LOG_EXCERPT_BYTES {
        return text.into_owned();
    }
    let mut end = LOG_EXCERPT_BYTES;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Short per-request id: start time in base-36 plus a process-local counter.
fn next_request_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", to_base36(millis), count)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

/// JSON detection tolerant of parameters (`application/json; charset=utf-8`).
pub(crate) fn is_json_content_type(value: Option<&axum::http::HeaderValue>) -> bool {
    value
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("application/json")
        })
        .unwrap_or(false)
}

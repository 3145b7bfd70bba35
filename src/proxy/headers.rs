//! Header policy for forwarded requests and relayed responses
//!
//! Three concerns meet here: hop-by-hop hygiene (RFC 7230 §6.1, including
//! headers nominated by the `Connection` header), identity hygiene (the
//! proxy must not let clients spoof forwarding headers, and must never leak
//! an `authorization` credential to zai), and body-length truth (a rewritten
//! body invalidates the inbound `content-length`).

use crate::config::UpstreamName;
use crate::routing::Route;
use axum::http::{header, HeaderMap, HeaderValue};
use std::collections::HashSet;

/// Hop-by-hop headers that never cross the proxy, either direction.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
];

/// Forwarding/identity headers the client must not smuggle upstream.
const IDENTITY_HEADERS: [&str; 6] = [
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-forwarded-port",
    "x-real-ip",
    "forwarded",
];

/// Header names nominated for removal by the `Connection` header's
/// comma-separated value list, lowercased.
fn connection_listed(headers: &HeaderMap) -> HashSet<String> {
    let mut listed = HashSet::new();
    for value in headers.get_all(header::CONNECTION) {
        let Ok(value) = value.to_str() else { continue };
        for token in value.split(',') {
            let token = token.trim().to_ascii_lowercase();
            if !token.is_empty() {
                listed.insert(token);
            }
        }
    }
    listed
}

/// Build the header set forwarded upstream.
///
/// `rewritten_len` carries the new body length when the proxy rewrote the
/// body (model rename or sanitization); it forces a correct
/// `content-length`, adding one if the original request had none.
pub(crate) fn build_forward_headers(
    inbound: &HeaderMap,
    route: &Route,
    rewritten_len: Option<usize>,
) -> HeaderMap {
    let listed = connection_listed(inbound);
    let mut out = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound.iter() {
        let n = name.as_str();
        if HOP_BY_HOP.contains(&n)
            || IDENTITY_HEADERS.contains(&n)
            || n == "host"
            || listed.contains(n)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    // The proxy buffers and rewrites bodies; it cannot do that through a
    // compressed response, so the upstream must not compress.
    out.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    if let Some(len) = rewritten_len {
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    if route.name == UpstreamName::Zai {
        // Never leak the client's OAuth credential to zai.
        out.remove(header::AUTHORIZATION);
        if let Some(key) = route.api_key.as_deref().filter(|k| !k.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(key) {
                out.insert("x-api-key", value);
            }
        }
    }

    out
}

/// Filter upstream response headers for relay to the client.
///
/// `rewritten_len` is set when the proxy buffered (and possibly rewrote)
/// the body; it additionally drops `content-encoding` and pins
/// `content-length` to the relayed body.
pub(crate) fn filter_response_headers(
    upstream: &HeaderMap,
    rewritten_len: Option<usize>,
) -> HeaderMap {
    let listed = connection_listed(upstream);
    let mut out = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream.iter() {
        let n = name.as_str();
        if HOP_BY_HOP.contains(&n) || listed.contains(n) {
            continue;
        }
        if rewritten_len.is_some() && (n == "content-encoding" || n == "content-length") {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    if let Some(len) = rewritten_len {
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    out
}

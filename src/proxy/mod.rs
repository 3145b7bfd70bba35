//! Proxy module - HTTP server that routes requests between upstreams
//!
//! This module implements the routing data plane: an axum server that
//! inspects each request's `model` field, picks the anthropic or zai
//! upstream, rewrites authentication and thinking-block shapes in both
//! directions, and relays the response.
//!
//! STREAMING: SSE and other non-JSON responses are streamed chunk-for-chunk
//! to the client. Only JSON bodies that need rewriting (zai) or inspection
//! (anthropic signature capture) are buffered.

mod error;
mod handler;
mod headers;
mod server;

pub use server::{run_server, start_proxy};

pub(crate) use handler::proxy_handler;

use crate::routing::RouteTable;
use crate::signatures::SignatureStore;
use std::sync::Arc;

/// Shared state for the proxy server
#[derive(Clone)]
pub struct ProxyState {
    /// HTTP client for forwarding requests
    pub(crate) client: reqwest::Client,
    /// Compiled routing table
    pub(crate) routes: Arc<RouteTable>,
    /// Thinking-signature LRU shared by all in-flight requests
    pub(crate) signatures: Arc<SignatureStore>,
}

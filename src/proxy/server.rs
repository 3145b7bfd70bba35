//! Proxy server setup and initialization

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::any, Router};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

use super::{proxy_handler, ProxyState};
use crate::config::Config;
use crate::routing::RouteTable;
use crate::signatures::SignatureStore;

/// Start the proxy server
pub async fn start_proxy(
    config: Config,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = (config.proxy.host.as_str(), config.proxy.port);
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.proxy.host, config.proxy.port))?;
    run_server(config, listener, shutdown_rx).await
}

/// Serve the proxy on an already-bound listener.
pub async fn run_server(
    config: Config,
    listener: TcpListener,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    // Build the HTTP client.
    // NOTE: No default User-Agent and no client-level timeout - the original
    // User-Agent must reach anthropic (OAuth'd Claude Code requests are
    // validated on it) and the per-request deadline lives in the handler so
    // long-lived SSE streams are not cut off.
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        // Force HTTP/1.1 to avoid HTTP/2 connection reset issues with some providers
        .http1_only()
        .build()
        .context("Failed to create HTTP client")?;

    let routes = Arc::new(RouteTable::new(&config.routing, &config.upstreams));
    let signatures = Arc::new(SignatureStore::new(config.signature_store.max_size));

    if let Some(key) = config
        .upstreams
        .zai
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
    {
        // Never log the key itself, only a fingerprint for support debugging.
        tracing::info!(
            component = "server",
            "zai api key configured (sha256 {})",
            key_fingerprint(key)
        );
    } else {
        tracing::info!(component = "server", "zai api key not configured");
    }

    let state = ProxyState {
        client,
        routes: routes.clone(),
        signatures,
    };

    // All paths go to the proxy handler; the proxy is path-transparent.
    let app = Router::new()
        .route("/", any(proxy_handler))
        .route("/*path", any(proxy_handler))
        .with_state(state);

    let local_addr = listener.local_addr().context("No local address")?;

    tracing::info!(component = "server", "Proxy listening on {}", local_addr);
    tracing::info!(
        component = "server",
        "Upstreams: anthropic={} zai={}",
        config.upstreams.anthropic.url,
        config.upstreams.zai.url
    );
    tracing::info!(
        component = "server",
        "Routing: {} rule(s), default={}",
        routes.rule_count(),
        routes.default_upstream()
    );

    // Start serving requests with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("Server error")?;

    tracing::info!(component = "server", "Proxy server shut down gracefully");
    Ok(())
}

/// First 16 hex chars of the key's SHA-256; safe to log.
fn key_fingerprint(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)[..16].to_string()
}

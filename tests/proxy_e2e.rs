//! End-to-end proxy tests against in-process mock upstreams
//!
//! Each test boots the real proxy on an ephemeral port, points its upstream
//! config at mock axum servers, and drives it with a plain reqwest client.
//! The mocks record everything they receive so tests can assert on the
//! forwarded wire bytes, not just the relayed response.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use cc_glm::config::Config;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Recorded {
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Recorded {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("recorded body should be JSON")
    }
}

/// A mock upstream that records requests and replies with a canned response.
#[derive(Clone)]
struct MockUpstream {
    requests: Arc<Mutex<Vec<Recorded>>>,
    responses: Arc<Mutex<VecDeque<(StatusCode, String, String)>>>,
}

impl MockUpstream {
    fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn push_json_response(&self, status: StatusCode, body: Value) {
        self.responses.lock().unwrap().push_back((
            status,
            "application/json".to_string(),
            body.to_string(),
        ));
    }

    fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    async fn serve(self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/*path", any(mock_handler))
            .with_state(self);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }
}

async fn mock_handler(State(mock): State<MockUpstream>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    mock.requests.lock().unwrap().push(Recorded {
        path: parts.uri.path().to_string(),
        headers: parts.headers,
        body: bytes,
    });

    let canned = mock.responses.lock().unwrap().pop_front();
    match canned {
        Some((status, content_type, body)) => Response::builder()
            .status(status)
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap(),
        None => (StatusCode::OK, "ok").into_response(),
    }
}

/// Keeps the proxy's shutdown sender alive for the test's duration.
struct ProxyHandle {
    addr: SocketAddr,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

async fn spawn_proxy(config: Config) -> ProxyHandle {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = cc_glm::proxy::run_server(config, listener, shutdown_rx).await;
    });
    ProxyHandle {
        addr,
        _shutdown_tx: shutdown_tx,
    }
}

fn base_config(anthropic: SocketAddr, zai: SocketAddr) -> Config {
    let mut config = Config::default();
    config.upstreams.anthropic.url = format!("http://{}", anthropic);
    config.upstreams.zai.url = format!("http://{}/api/anthropic", zai);
    config.upstreams.zai.api_key = Some("zk-test-key".to_string());
    config.lifecycle.state_dir = std::env::temp_dir().join("cc-glm-e2e");
    config
}

fn zai_rule(pattern: &str, model: Option<&str>) -> cc_glm::config::RouteRule {
    cc_glm::config::RouteRule {
        pattern: pattern.to_string(),
        upstream: "zai".to_string(),
        model: model.map(String::from),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

/// Routing: model glob picks zai, the outbound model is renamed, the
/// client's authorization is stripped, and the configured key rides as
/// x-api-key on the upstream's base path.
#[tokio::test]
async fn routes_matching_model_to_zai_with_rename_and_auth_rewrite() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    mock_b.push_json_response(StatusCode::OK, json!({"content": []}));
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let mut config = base_config(addr_a, addr_b);
    config
        .routing
        .rules
        .push(zai_rule("claude-sonnet-*", Some("glm-4-plus")));
    let proxy = spawn_proxy(config).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .header("authorization", "Bearer oauth-secret")
        .body(json!({"model": "claude-sonnet-4-5"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let recorded = mock_b.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].path, "/api/anthropic/v1/messages");
    assert_eq!(recorded[0].json()["model"], "glm-4-plus");
    assert!(recorded[0].headers.get("authorization").is_none());
    assert_eq!(recorded[0].headers.get("x-api-key").unwrap(), "zk-test-key");
    assert_eq!(
        recorded[0].headers.get("accept-encoding").unwrap(),
        "identity"
    );
    assert!(mock_a.recorded().is_empty());
}

/// Signature round trip: a signature captured from an anthropic response
/// marks that thinking block as anthropic-origin; on the next request the
/// block passes through verbatim while the history is repaired around it.
#[tokio::test]
async fn anthropic_signature_survives_the_round_trip() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    mock_a.push_json_response(
        StatusCode::OK,
        json!({"content": [{"type": "thinking", "signature": "S1", "content": "T"}]}),
    );
    mock_a.push_json_response(StatusCode::OK, json!({"content": []}));
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let proxy = spawn_proxy(base_config(addr_a, addr_b)).await;
    let client = reqwest::Client::new();

    // Turn 1: response teaches the proxy signature S1.
    let first = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(json!({"model": "claude-sonnet-4-5", "messages": [{"role": "user", "content": "hi"}]}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_body: Value = first.json().await.unwrap();
    assert_eq!(first_body["content"][0]["signature"], "S1");

    // Turn 2: the echoed history leads with an assistant message carrying
    // the signed block.
    let second = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(
            json!({
                "model": "claude-sonnet-4-5",
                "messages": [
                    {"role": "assistant", "content": [
                        {"type": "thinking", "signature": "S1", "content": "T"},
                    ]},
                    {"role": "user", "content": "continue"},
                ],
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);

    let recorded = mock_a.recorded();
    assert_eq!(recorded.len(), 2);
    let forwarded = recorded[1].json();
    let messages = forwarded["messages"].as_array().unwrap();
    // Leading assistant dropped per structure repair; the signed block is
    // gone with it, but nothing was converted to text.
    assert_eq!(messages[0]["role"], "user");
    assert!(!forwarded.to_string().contains("previous-glm-reasoning"));
}

/// The signed block survives byte-for-byte when it sits in a legal
/// position.
#[tokio::test]
async fn signed_thinking_block_is_forwarded_verbatim() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    mock_a.push_json_response(
        StatusCode::OK,
        json!({"content": [{"type": "thinking", "signature": "S9", "content": "T"}]}),
    );
    mock_a.push_json_response(StatusCode::OK, json!({"content": []}));
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let proxy = spawn_proxy(base_config(addr_a, addr_b)).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(json!({"messages": [{"role": "user", "content": "hi"}]}).to_string())
        .send()
        .await
        .unwrap();

    client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(
            json!({
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": [
                        {"type": "thinking", "signature": "S9", "content": "T"},
                        {"type": "text", "text": "answer"},
                    ]},
                    {"role": "user", "content": "go on"},
                ],
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();

    let forwarded = mock_a.recorded()[1].json();
    let block = &forwarded["messages"][1]["content"][0];
    assert_eq!(block["type"], "thinking");
    assert_eq!(block["signature"], "S9");
    assert_eq!(block["content"], "T");
}

/// zai response rewrite: the nested thinking shape is flattened to the
/// anthropic-compatible one before the client sees it.
#[tokio::test]
async fn zai_response_thinking_blocks_are_rewritten() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    mock_b.push_json_response(
        StatusCode::OK,
        json!({"content": [{"type": "thinking", "thinking": {"thinking": "X", "signature": "zs"}}]}),
    );
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let mut config = base_config(addr_a, addr_b);
    config.routing.rules.push(zai_rule("glm-*", None));
    let proxy = spawn_proxy(config).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(json!({"model": "glm-4-plus"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let content_length: usize = response
        .headers()
        .get("content-length")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body: Value = response.json().await.unwrap();

    let block = &body["content"][0];
    assert_eq!(block["type"], "thinking");
    assert_eq!(block["content"], "X");
    assert!(block.get("signature").is_none());
    assert!(block.get("thinking").is_none());
    assert_eq!(content_length, body.to_string().len());
}

/// Orphan tool_result: with no matching tool_use in the previous assistant
/// message, the block reaches anthropic as plain text.
#[tokio::test]
async fn orphan_tool_result_is_converted_before_anthropic() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    mock_a.push_json_response(StatusCode::OK, json!({"content": []}));
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let proxy = spawn_proxy(base_config(addr_a, addr_b)).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(
            json!({
                "messages": [
                    {"role": "user", "content": [
                        {"type": "tool_result", "tool_use_id": "t1", "content": "ok"},
                    ]},
                ],
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let forwarded = mock_a.recorded()[0].json();
    assert_eq!(
        forwarded["messages"][0]["content"][0],
        json!({"type": "text", "text": "[previous tool result]\nok"})
    );
}

/// Payload cap: a request body over 10 MiB draws the 413 envelope and never
/// reaches an upstream.
#[tokio::test]
async fn oversized_request_body_is_rejected_before_dial() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let proxy = spawn_proxy(base_config(addr_a, addr_b)).await;

    let oversized = vec![b'x'; 10 * 1024 * 1024 + 1];
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(oversized)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["error"], "payload_too_large");
    assert!(envelope["message"].is_string());

    assert!(mock_a.recorded().is_empty());
    assert!(mock_b.recorded().is_empty());
}

/// Upstream connection failure draws the 502 envelope.
#[tokio::test]
async fn unreachable_upstream_yields_proxy_error_envelope() {
    // Reserve a port and free it so nothing listens there.
    let dead_addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let proxy = spawn_proxy(base_config(dead_addr, dead_addr)).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(json!({"model": "claude-sonnet-4-5"}).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["error"], "proxy_error");
}

/// Non-JSON responses stream through untouched, thinking shapes included.
#[tokio::test]
async fn non_json_zai_response_streams_through_unmodified() {
    let mock_a = MockUpstream::new();
    let mock_b = MockUpstream::new();
    let sse = "event: content_block_start\ndata: {\"type\":\"thinking\",\"thinking\":\"X\"}\n\n";
    mock_b.responses.lock().unwrap().push_back((
        StatusCode::OK,
        "text/event-stream".to_string(),
        sse.to_string(),
    ));
    let addr_a = mock_a.clone().serve().await;
    let addr_b = mock_b.clone().serve().await;

    let mut config = base_config(addr_a, addr_b);
    config.routing.rules.push(zai_rule("glm-*", None));
    let proxy = spawn_proxy(config).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/v1/messages", proxy.addr))
        .header("content-type", "application/json")
        .body(json!({"model": "glm-4"}).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), sse);
}

//! Proxy error types and the client-visible error envelope

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};
use serde_json::json;

/// Errors the proxy synthesizes on behalf of the client.
///
/// Each variant maps to a fixed `error` kind in the JSON envelope; the
/// message carries the human-readable detail.
#[derive(Debug)]
pub(crate) enum ProxyError {
    /// Inbound request body exceeded the buffering cap.
    PayloadTooLarge(String),
    /// Upstream did not answer within the request timeout.
    GatewayTimeout(String),
    /// Dial, DNS, reset, or any other upstream transport failure.
    Upstream(String),
    /// Response rewrite failed or its buffering cap was exceeded.
    Transform(String),
}

impl ProxyError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::GatewayTimeout(_) => "gateway_timeout",
            Self::Upstream(_) => "proxy_error",
            Self::Transform(_) => "transform_error",
        }
    }

    pub(crate) fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) | Self::Transform(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::PayloadTooLarge(m)
            | Self::GatewayTimeout(m)
            | Self::Upstream(m)
            | Self::Transform(m) => m,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response<Body> {
        let envelope = json!({
            "error": self.kind(),
            "message": self.message(),
        });

        tracing::warn!(
            component = "proxy",
            error_code = self.kind(),
            status = self.status().as_u16(),
            "{}",
            self.message()
        );

        Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(envelope.to_string()))
            .unwrap_or_else(|_| Response::new(Body::from("internal error building error response")))
    }
}

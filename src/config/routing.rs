//! Upstream and routing-rule configuration
//!
//! Two upstreams exist: `anthropic` (the reference Anthropic API) and `zai`
//! (a GLM-family endpoint speaking a near-Anthropic wire format). Routing
//! rules map model-name globs onto one of them, optionally renaming the
//! outbound model.

use serde::Deserialize;

// ─────────────────────────────────────────────────────────────────────────────
// Upstream identity
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of upstream names a rule may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamName {
    /// Reference API; the authority on the wire format and the only issuer
    /// of verifiable thinking-block signatures.
    Anthropic,
    /// GLM-family endpoint; Anthropic-compatible except for the shape of
    /// thinking blocks.
    Zai,
}

impl UpstreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Zai => "zai",
        }
    }

    /// Parse a configured upstream name. Returns `None` for anything outside
    /// the closed set; callers decide whether that skips a rule or falls back.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "anthropic" => Some(Self::Anthropic),
            "zai" => Some(Self::Zai),
            _ => None,
        }
    }
}

impl std::fmt::Display for UpstreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// The anthropic endpoint: base URL only. The client's `authorization`
/// header passes through byte-exact, so there is no key to configure;
/// `deny_unknown_fields` turns a stray `api_key` here into a parse error
/// instead of a silently dead setting.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicUpstreamConfig {
    /// Base URL, e.g. `https://api.anthropic.com`.
    pub url: String,
}

impl Default for AnthropicUpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://api.anthropic.com".to_string(),
        }
    }
}

/// The zai endpoint: base URL plus the key the proxy emits as `x-api-key`
/// after stripping the client's `authorization`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZaiUpstreamConfig {
    /// Base URL, e.g. `https://api.z.ai/api/anthropic`.
    pub url: String,

    /// API key sent as `x-api-key`. Absent is legal: requests fail at the
    /// upstream, not in the proxy.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ZaiUpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://api.z.ai/api/anthropic".to_string(),
            api_key: None,
        }
    }
}

/// Both upstream endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    pub anthropic: AnthropicUpstreamConfig,
    pub zai: ZaiUpstreamConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing rules
// ─────────────────────────────────────────────────────────────────────────────

/// One routing rule: a model-name glob, the upstream it selects, and an
/// optional outbound model rename.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRule {
    /// Glob pattern over the request's `model` field. `*` is the only
    /// metacharacter.
    #[serde(rename = "match")]
    pub pattern: String,

    /// Target upstream name. Validated against the closed set when the route
    /// table is built; invalid names are logged and the rule is skipped.
    pub upstream: String,

    /// Outbound model rename applied when this rule wins.
    #[serde(default)]
    pub model: Option<String>,
}

/// Ordered rules plus the fallback upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub rules: Vec<RouteRule>,

    /// Upstream used when no rule matches. An invalid name here falls back
    /// to anthropic.
    #[serde(rename = "default", default = "default_upstream_name")]
    pub default_upstream: String,
}

fn default_upstream_name() -> String {
    "anthropic".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_upstream: default_upstream_name(),
        }
    }
}

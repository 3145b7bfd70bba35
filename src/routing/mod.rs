//! Rule-based upstream selection
//!
//! Every request's `model` field is matched against the configured rules in
//! declared order; the first match wins and yields a [`Route`]. Patterns are
//! compiled once when the table is built. Selection has no failure path:
//! bad rules are skipped at build time and a bad default falls back to the
//! anthropic upstream.

pub mod pattern;

use crate::config::{RoutingConfig, UpstreamName, UpstreamsConfig};
use pattern::Pattern;

/// The per-request routing decision. Stack-scoped to a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub name: UpstreamName,
    /// Upstream base URL (scheme + authority + base path).
    pub url: String,
    /// Key to emit as `x-api-key`; populated for zai only.
    pub api_key: Option<String>,
    /// Outbound model rename from the winning rule.
    pub model: Option<String>,
}

struct CompiledRule {
    pattern: Pattern,
    upstream: UpstreamName,
    model: Option<String>,
}

/// Compiled routing table, built once at server start.
pub struct RouteTable {
    rules: Vec<CompiledRule>,
    default_upstream: UpstreamName,
    upstreams: UpstreamsConfig,
}

impl RouteTable {
    pub fn new(routing: &RoutingConfig, upstreams: &UpstreamsConfig) -> Self {
        let mut rules = Vec::with_capacity(routing.rules.len());
        for rule in &routing.rules {
            let Some(upstream) = UpstreamName::parse(&rule.upstream) else {
                tracing::warn!(
                    component = "routing",
                    upstream = %rule.upstream,
                    pattern = %rule.pattern,
                    "Skipping rule with unknown upstream name"
                );
                continue;
            };
            rules.push(CompiledRule {
                pattern: Pattern::compile(&rule.pattern),
                upstream,
                model: rule.model.clone(),
            });
        }

        let default_upstream = match UpstreamName::parse(&routing.default_upstream) {
            Some(name) => name,
            None => {
                tracing::warn!(
                    component = "routing",
                    default = %routing.default_upstream,
                    "Unknown default upstream, falling back to anthropic"
                );
                UpstreamName::Anthropic
            }
        };

        Self {
            rules,
            default_upstream,
            upstreams: upstreams.clone(),
        }
    }

    /// Number of valid (compiled) rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn default_upstream(&self) -> UpstreamName {
        self.default_upstream
    }

    /// Resolve a route for a model name. A request without a model matches
    /// patterns against the empty string.
    pub fn select(&self, model: Option<&str>) -> Route {
        let subject = model.unwrap_or("");

        for rule in &self.rules {
            if rule.pattern.matches(subject) {
                return self.route_for(rule.upstream, rule.model.clone());
            }
        }

        self.route_for(self.default_upstream, None)
    }

    fn route_for(&self, name: UpstreamName, model: Option<String>) -> Route {
        match name {
            UpstreamName::Anthropic => Route {
                name,
                url: self.upstreams.anthropic.url.clone(),
                api_key: None,
                model,
            },
            UpstreamName::Zai => Route {
                name,
                url: self.upstreams.zai.url.clone(),
                api_key: self.upstreams.zai.api_key.clone(),
                model,
            },
        }
    }
}

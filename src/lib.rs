// cc-glm - Routing proxy between Claude Code and two upstream message APIs
//
// The proxy sits on loopback in front of the Anthropic API and a GLM-family
// endpoint that claims wire compatibility but diverges on thinking blocks.
// Each request is routed on its `model` field; authentication and
// thinking-block shapes are rewritten per upstream so either side accepts
// the other's conversations.
//
// Architecture:
// - Proxy server (axum): routes requests, rewrites headers/bodies, relays
// - Sanitizer: normalizes thinking blocks and repairs message structure
// - Signature store: bounded LRU distinguishing anthropic-origin blocks
// - Lifecycle: one detached server per host:port, lock-dir singleton
// - Logging (tracing): JSON lines into the state directory

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod proxy;
pub mod routing;
pub mod sanitize;
pub mod signatures;
pub mod startup;
pub mod transform;

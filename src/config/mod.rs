//! Configuration for the routing proxy
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/cc-glm/config.toml)
//! 3. Built-in defaults (lowest priority)
//!
//! The loaded [`Config`] is immutable for the life of the process and is
//! shared by reference with every component.

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod lifecycle;
mod observability;
mod routing;
mod serialization;

#[cfg(test)]
mod tests;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use lifecycle::LifecycleConfig;
pub use observability::{LogLevel, LoggingConfig, SignatureStoreConfig};
pub use routing::{
    AnthropicUpstreamConfig, RouteRule, RoutingConfig, UpstreamName, UpstreamsConfig,
    ZaiUpstreamConfig,
};

pub(crate) use lifecycle::FileLifecycle;
pub(crate) use observability::{FileLogging, FileSignatureStore};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the structured JSON-lines log inside the state directory.
pub const STRUCTURED_LOG_FILE: &str = "cc-glm.jsonl";

// ─────────────────────────────────────────────────────────────────────────────
// Application configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Listen address for the proxy server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the proxy server to
    pub proxy: ProxyConfig,

    /// The two upstream endpoints
    pub upstreams: UpstreamsConfig,

    /// Ordered routing rules plus the default upstream
    pub routing: RoutingConfig,

    /// Singleton start/stop tunables and the state directory
    pub lifecycle: LifecycleConfig,

    /// Thinking-signature LRU capacity
    pub signature_store: SignatureStoreConfig,

    /// Log verbosity and sink
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            upstreams: UpstreamsConfig::default(),
            routing: RoutingConfig::default(),
            lifecycle: LifecycleConfig::default(),
            signature_store: SignatureStoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Resolved path of the structured log file: explicit `logging.file`,
    /// else `<state_dir>/cc-glm.jsonl`.
    pub fn structured_log_path(&self) -> PathBuf {
        self.logging
            .file
            .clone()
            .unwrap_or_else(|| self.lifecycle.state_dir.join(STRUCTURED_LOG_FILE))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure. Every section is optional; missing sections take
/// their defaults.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub proxy: Option<ProxyConfig>,
    pub upstream: Option<UpstreamsConfig>,
    pub routing: Option<RoutingConfig>,
    pub lifecycle: Option<FileLifecycle>,
    pub signature_store: Option<FileSignatureStore>,
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/cc-glm/config.toml
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("cc-glm").join("config.toml"))
    }

    /// Load file config if it exists.
    ///
    /// A config file that exists but cannot be parsed is a fatal error:
    /// silently falling back to defaults would have the proxy routing to the
    /// wrong upstream while the user debugs the wrong thing.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: failed to parse config file {}", path.display());
                    eprintln!("  {}", e);
                    eprintln!("  To reset, delete the file and restart cc-glm.");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("error: cannot read config file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars > file > defaults.
    pub fn from_env() -> Self {
        let file = Self::load_file_config();
        Self::from_file_config(file)
    }

    pub(crate) fn from_file_config(file: FileConfig) -> Self {
        let mut proxy = file.proxy.unwrap_or_default();

        // Bind override: CC_GLM_BIND="host:port"
        if let Ok(bind) = std::env::var("CC_GLM_BIND") {
            if let Some((host, port)) = bind.rsplit_once(':') {
                if let Ok(port) = port.parse::<u16>() {
                    proxy.host = host.to_string();
                    proxy.port = port;
                }
            }
        }

        let mut upstreams = file.upstream.unwrap_or_default();

        // API key for zai: env takes precedence over file
        if let Ok(key) = std::env::var("ZAI_API_KEY") {
            if !key.is_empty() {
                upstreams.zai.api_key = Some(key);
            }
        }

        let routing = file.routing.unwrap_or_default();
        let lifecycle = LifecycleConfig::from_file(file.lifecycle);
        let signature_store = SignatureStoreConfig::from_file(file.signature_store);
        let logging = LoggingConfig::from_file(file.logging);

        Self {
            proxy,
            upstreams,
            routing,
            lifecycle,
            signature_store,
            logging,
        }
    }
}

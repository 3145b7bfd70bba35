//! Config file template generation
//!
//! `Config::to_toml()` is the single source of truth for the config file
//! shape: `config --reset` writes it, `ensure_config_exists` seeds it on
//! first run, and the round-trip test parses it back through `FileConfig`
//! so the template can never drift from the deserializer.

use super::Config;
use std::fmt::Write;

impl Config {
    /// Render this configuration as a commented TOML file.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# cc-glm configuration");
        let _ = writeln!(out, "# Routing proxy between Claude Code and GLM-family upstreams");
        let _ = writeln!(out);

        let _ = writeln!(out, "[proxy]");
        let _ = writeln!(out, "host = {:?}", self.proxy.host);
        let _ = writeln!(out, "port = {}", self.proxy.port);
        let _ = writeln!(out);

        let _ = writeln!(out, "[upstream.anthropic]");
        let _ = writeln!(out, "url = {:?}", self.upstreams.anthropic.url);
        let _ = writeln!(out);

        let _ = writeln!(out, "[upstream.zai]");
        let _ = writeln!(out, "url = {:?}", self.upstreams.zai.url);
        match &self.upstreams.zai.api_key {
            Some(key) => {
                let _ = writeln!(out, "api_key = {:?}", key);
            }
            None => {
                let _ = writeln!(out, "# api_key = \"...\"  # or set ZAI_API_KEY");
            }
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[routing]");
        let _ = writeln!(out, "default = {:?}", self.routing.default_upstream);
        for rule in &self.routing.rules {
            let _ = writeln!(out);
            let _ = writeln!(out, "[[routing.rules]]");
            let _ = writeln!(out, "match = {:?}", rule.pattern);
            let _ = writeln!(out, "upstream = {:?}", rule.upstream);
            if let Some(model) = &rule.model {
                let _ = writeln!(out, "model = {:?}", model);
            }
        }
        if self.routing.rules.is_empty() {
            let _ = writeln!(out, "#");
            let _ = writeln!(out, "# [[routing.rules]]");
            let _ = writeln!(out, "# match = \"claude-sonnet-*\"");
            let _ = writeln!(out, "# upstream = \"zai\"");
            let _ = writeln!(out, "# model = \"glm-4-plus\"");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[lifecycle]");
        let _ = writeln!(out, "stop_grace_seconds = {}", self.lifecycle.stop_grace_seconds);
        let _ = writeln!(out, "start_wait_seconds = {}", self.lifecycle.start_wait_seconds);
        let _ = writeln!(
            out,
            "state_dir = {:?}",
            self.lifecycle.state_dir.display().to_string()
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "[signature_store]");
        let _ = writeln!(out, "max_size = {}", self.signature_store.max_size);
        let _ = writeln!(out);

        let _ = writeln!(out, "[logging]");
        let _ = writeln!(out, "level = {:?}", self.logging.level.as_str());
        match &self.logging.file {
            Some(path) => {
                let _ = writeln!(out, "file = {:?}", path.display().to_string());
            }
            None => {
                let _ = writeln!(out, "# file = \"/path/to/cc-glm.jsonl\"");
            }
        }

        out
    }

    /// Create the config file with defaults if it doesn't exist. Errors are
    /// swallowed; the config file is optional.
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let _ = std::fs::write(&path, Self::default().to_toml());
    }
}

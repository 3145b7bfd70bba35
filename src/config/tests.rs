//! Configuration tests

use super::*;

fn parse(toml_str: &str) -> Config {
    let file: FileConfig = toml::from_str(toml_str).expect("test TOML should parse");
    Config::from_file_config(file)
}

#[test]
fn test_empty_file_yields_defaults() {
    let config = parse("");
    assert_eq!(config.proxy.host, "127.0.0.1");
    assert_eq!(config.proxy.port, 8787);
    assert_eq!(config.upstreams.anthropic.url, "https://api.anthropic.com");
    assert_eq!(config.upstreams.zai.url, "https://api.z.ai/api/anthropic");
    assert_eq!(config.routing.default_upstream, "anthropic");
    assert!(config.routing.rules.is_empty());
    assert_eq!(config.signature_store.max_size, 1000);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_full_file_parses() {
    let config = parse(
        r#"
        [proxy]
        host = "0.0.0.0"
        port = 9999

        [upstream.anthropic]
        url = "https://api.anthropic.com"

        [upstream.zai]
        url = "https://api.z.ai/api/anthropic"
        api_key = "zk-test"

        [routing]
        default = "anthropic"

        [[routing.rules]]
        match = "claude-sonnet-*"
        upstream = "zai"
        model = "glm-4-plus"

        [[routing.rules]]
        match = "*"
        upstream = "anthropic"

        [lifecycle]
        stop_grace_seconds = 12
        start_wait_seconds = 5
        state_dir = "/tmp/cc-glm-test"

        [signature_store]
        max_size = 64

        [logging]
        level = "debug"
        file = "/tmp/cc-glm-test/out.jsonl"
        "#,
    );

    assert_eq!(config.proxy.port, 9999);
    assert_eq!(config.upstreams.zai.api_key.as_deref(), Some("zk-test"));
    assert_eq!(config.routing.rules.len(), 2);
    assert_eq!(config.routing.rules[0].pattern, "claude-sonnet-*");
    assert_eq!(config.routing.rules[0].model.as_deref(), Some("glm-4-plus"));
    assert_eq!(config.lifecycle.stop_grace_seconds, 12);
    assert_eq!(config.lifecycle.start_wait_seconds, 5);
    assert_eq!(config.signature_store.max_size, 64);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(
        config.structured_log_path(),
        std::path::PathBuf::from("/tmp/cc-glm-test/out.jsonl")
    );
}

#[test]
fn test_structured_log_path_defaults_to_state_dir() {
    let config = parse(
        r#"
        [lifecycle]
        state_dir = "/tmp/cc-glm-state"
        "#,
    );
    assert_eq!(
        config.structured_log_path(),
        std::path::PathBuf::from("/tmp/cc-glm-state/cc-glm.jsonl")
    );
}

/// Verify that the generated template can be parsed back. This catches
/// template drift against the FileConfig deserializer.
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );
}

#[test]
fn test_config_roundtrip_with_rules() {
    let mut config = Config::default();
    config.routing.rules.push(RouteRule {
        pattern: "claude-sonnet-*".to_string(),
        upstream: "zai".to_string(),
        model: Some("glm-4-plus".to_string()),
    });
    config.upstreams.zai.api_key = Some("zk-1".to_string());
    config.logging.file = Some(std::path::PathBuf::from("/tmp/x.jsonl"));

    let parsed: FileConfig = toml::from_str(&config.to_toml()).expect("template should parse");
    let reloaded = Config::from_file_config(parsed);
    assert_eq!(reloaded.routing.rules.len(), 1);
    assert_eq!(reloaded.routing.rules[0].model.as_deref(), Some("glm-4-plus"));
}

#[test]
fn test_rules_without_model_rename() {
    let config = parse(
        r#"
        [[routing.rules]]
        match = "glm-*"
        upstream = "zai"
        "#,
    );
    assert_eq!(config.routing.rules[0].model, None);
}

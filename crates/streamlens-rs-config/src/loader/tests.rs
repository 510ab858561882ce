//! Tests for layered configuration loading.

use super::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Verify that a minimal config parses with defaults.
#[test]
fn parse_minimal_config() {
    let json5 = "{}";
    let config = StreamlensConfig::load_from_str(json5).expect("config");
    assert_eq!(config.channel.reconnect_attempts, 10);
    assert_eq!(config.http.timeout_secs, 30);
    assert_eq!(config.channel.listing_stagger_ms, 800);
}

/// Reject unexpected top-level config keys.
#[test]
fn rejects_unknown_top_level_key() {
    let json5 = r#"{ unexpected: true }"#;
    let err = StreamlensConfig::load_from_str(json5).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("unknown key"));
}

/// Reject invalid analysis platform values.
#[test]
fn rejects_invalid_platform() {
    let json5 = r#"{ analysis: { platform: "fargate" } }"#;
    let err = StreamlensConfig::load_from_str(json5).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("analysis.platform"));
}

/// Reject websocket endpoints that are not ws:// or wss://.
#[test]
fn rejects_non_websocket_scheme() {
    let json5 = r#"{ endpoints: { websocket_url: "http://host/ws" } }"#;
    let err = StreamlensConfig::load_from_str(json5).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("ws://"));
}

/// Ensure repo config takes precedence over cwd config.
#[test]
fn layered_config_prefers_repo_over_cwd() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(&system_config, r#"{ identity: { user_id: "system" } }"#);

    let user_config = root.join("user.json5");
    write_json5(&user_config, r#"{ identity: { user_id: "user" } }"#);

    let project_config = project_root.join(DEFAULT_CONFIG_FILE);
    write_json5(&project_config, r#"{ identity: { user_id: "project" } }"#);

    let cwd_config = cwd.join(DEFAULT_CONFIG_FILE);
    write_json5(&cwd_config, r#"{ identity: { user_id: "cwd" } }"#);

    let repo_config = project_root
        .join(DEFAULT_CONFIG_DIR)
        .join(DEFAULT_CONFIG_FILE);
    write_json5(&repo_config, r#"{ identity: { user_id: "repo" } }"#);

    let mut options = LayeredConfigOptions::new();
    options.cwd = Some(cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = Some(user_config);

    let layered = StreamlensConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.identity.user_id, Some("repo".to_string()));
    assert_eq!(layered.layers.len(), 5);
}

/// Runtime paths are merged last and win over every implicit layer.
#[test]
fn runtime_override_wins() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(&system_config, r#"{ identity: { user_id: "system" } }"#);

    let runtime_config = root.join("runtime.json5");
    write_json5(&runtime_config, r#"{ identity: { user_id: "runtime" } }"#);

    let mut options = LayeredConfigOptions::new();
    options.cwd = Some(cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = None;
    options.runtime_paths = vec![runtime_config];

    let layered = StreamlensConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.identity.user_id, Some("runtime".to_string()));
}

/// Layers merge section-wise instead of replacing whole objects.
#[test]
fn layers_merge_within_sections() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let cwd = root.join("work");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(
        &system_config,
        r#"{ analysis: { temperature: 0.5 }, identity: { user_id: "ops" } }"#,
    );

    let cwd_config = cwd.join(DEFAULT_CONFIG_FILE);
    write_json5(&cwd_config, r#"{ analysis: { frequency: 30 } }"#);

    let mut options = LayeredConfigOptions::new();
    options.cwd = Some(cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = None;

    let layered = StreamlensConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.analysis.temperature, 0.5);
    assert_eq!(layered.config.analysis.frequency, 30);
    assert_eq!(layered.config.identity.user_id, Some("ops".to_string()));
}

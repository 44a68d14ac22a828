// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for TOML parsing, defaults, and diagnostics.

use highclaw_config::{ConfigError, load_and_validate_path, load_and_validate_str};
use highclaw_core::{DmScope, GroupActivation};

/// A complete config exercising every section parses into the expected values.
#[test]
fn full_config_parses() {
    let toml = r#"
[agent]
id = "ops"
name = "Ops Bot"
log_level = "debug"
system_prompt = "Be brief."

[session]
main_key = "home"
dm_scope = "perAccountChannelPeer"
history_limit = 20
history_max_chars = 1000
idempotency_ttl_secs = 60
group_activation = "always"
prune_max_age_days = 7
prune_max_count = 3

[session.identity_links]
alice = ["telegram:alice_tg", "whatsapp:alice_wa"]

[storage]
root_dir = "/var/lib/highclaw"
file_mode = 0o640

[gateway]
host = "0.0.0.0"
port = 8080
bearer_token = "tok"

[anthropic]
api_key = "sk-test"
max_tokens = 1024
"#;

    let config = load_and_validate_str(toml).expect("full config should validate");
    assert_eq!(config.agent.id, "ops");
    assert_eq!(config.agent.system_prompt.as_deref(), Some("Be brief."));
    assert_eq!(config.session.main_key, "home");
    assert_eq!(config.session.dm_scope, DmScope::PerAccountChannelPeer);
    assert_eq!(config.session.group_activation, GroupActivation::Always);
    assert_eq!(config.session.identity_links["alice"].len(), 2);
    assert_eq!(config.storage.file_mode, 0o640);
    assert_eq!(
        config.storage.root_path(),
        std::path::PathBuf::from("/var/lib/highclaw")
    );
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.anthropic.max_tokens, 1024);
}

/// An empty document yields the documented defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = load_and_validate_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.id, "main");
    assert_eq!(config.agent.name, "highclaw");
    assert_eq!(config.session.main_key, "main");
    assert_eq!(config.session.dm_scope, DmScope::Main);
    assert_eq!(config.session.history_limit, 16);
    assert_eq!(config.session.history_max_chars, 3000);
    assert_eq!(config.session.idempotency_ttl_secs, 300);
    assert_eq!(config.session.reply_timeout_secs, 120);
    assert_eq!(config.storage.file_mode, 0o600);
    assert!(config.storage.root_dir.is_none());
    assert!(config.storage.root_path().ends_with(".highclaw"));
    assert_eq!(config.gateway.host, "127.0.0.1");
    assert!(config.gateway.bearer_token.is_none());
    assert!(config.anthropic.api_key.is_none());
}

/// Unknown keys produce a diagnostic with a suggestion and a source span.
#[test]
fn unknown_key_suggests_correction() {
    let toml = "[session]\ndm_scop = \"perPeer\"\n";
    let errors = load_and_validate_str(toml).expect_err("typo should be rejected");

    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "dm_scop");
            assert_eq!(suggestion.as_deref(), Some("dm_scope"));
            assert!(span.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// An unknown dm scope value is a type/variant error, not a silent default.
#[test]
fn unknown_dm_scope_is_rejected() {
    let toml = "[session]\ndm_scope = \"perGalaxy\"\n";
    assert!(load_and_validate_str(toml).is_err());
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_errors_surface_from_str() {
    let toml = "[gateway]\nhost = \"\"\n";
    let errors = load_and_validate_str(toml).expect_err("empty host must fail");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

/// An explicit config path is loaded without consulting the XDG hierarchy.
#[test]
fn explicit_path_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[agent]\nname = \"from-file\"\n").unwrap();

    let config = load_and_validate_path(&path).expect("explicit file should load");
    assert_eq!(config.agent.name, "from-file");
}

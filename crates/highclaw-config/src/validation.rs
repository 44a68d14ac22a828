// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero limits, well-formed identity-link aliases, and bind addresses.

use crate::diagnostic::ConfigError;
use crate::model::HighclawConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every error rather than failing fast.
pub fn validate_config(config: &HighclawConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let agent_id = config.agent.id.trim();
    if agent_id.is_empty() {
        errors.push(ConfigError::validation("agent.id must not be empty"));
    } else if !agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        errors.push(ConfigError::validation(format!(
            "agent.id `{agent_id}` may only contain letters, digits, `-` and `_`"
        )));
    }

    let session = &config.session;
    if session.main_key.trim().is_empty() {
        errors.push(ConfigError::validation("session.main_key must not be empty"));
    }
    for (name, value) in [
        ("session.history_limit", session.history_limit as u64),
        ("session.history_max_chars", session.history_max_chars as u64),
        ("session.idempotency_ttl_secs", session.idempotency_ttl_secs),
        ("session.reply_timeout_secs", session.reply_timeout_secs),
        ("gateway.reply_timeout_secs", config.gateway.reply_timeout_secs),
        ("anthropic.max_tokens", u64::from(config.anthropic.max_tokens)),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{name} must be greater than zero"
            )));
        }
    }

    for (person, aliases) in &session.identity_links {
        if person.trim().is_empty() {
            errors.push(ConfigError::validation(
                "session.identity_links has an empty canonical id",
            ));
        }
        for alias in aliases {
            let well_formed = alias
                .split_once(':')
                .is_some_and(|(ch, peer)| !ch.trim().is_empty() && !peer.trim().is_empty());
            if !well_formed {
                errors.push(ConfigError::validation(format!(
                    "session.identity_links.{person}: alias `{alias}` must look like `<channel>:<peerId>`"
                )));
            }
        }
    }

    if config.storage.file_mode > 0o777 || config.storage.file_mode & 0o600 != 0o600 {
        errors.push(ConfigError::validation(format!(
            "storage.file_mode {:o} must be at most 777 and owner read/write",
            config.storage.file_mode
        )));
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config
        .gateway
        .bearer_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::validation(
            "gateway.bearer_token must not be blank; omit it to disable auth",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

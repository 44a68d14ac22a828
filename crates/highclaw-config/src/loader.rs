// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./highclaw.toml` > `~/.config/highclaw/highclaw.toml` >
//! `/etc/highclaw/highclaw.toml` with environment variable overrides via `HIGHCLAW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::HighclawConfig;

const SYSTEM_CONFIG: &str = "/etc/highclaw/highclaw.toml";
const LOCAL_CONFIG: &str = "highclaw.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/highclaw/highclaw.toml` (system-wide)
/// 3. `~/.config/highclaw/highclaw.toml` (user XDG config)
/// 4. `./highclaw.toml` (local directory)
/// 5. `HIGHCLAW_*` environment variables
pub fn load_config() -> Result<HighclawConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<HighclawConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HighclawConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HighclawConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HighclawConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for XDG config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(HighclawConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// The candidate config files, lowest precedence first.
pub(crate) fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(user_config_path());
    paths.push(PathBuf::from(LOCAL_CONFIG));
    paths
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("highclaw/highclaw.toml"))
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so that underscore-containing
/// key names survive: `HIGHCLAW_SESSION_DM_SCOPE` maps to `session.dm_scope`,
/// not `session.dm.scope`.
fn env_provider() -> Env {
    Env::prefixed("HIGHCLAW_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("agent_", "agent.", 1)
            .replacen("session_", "session.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("anthropic_", "anthropic.", 1);
        mapped.into()
    })
}

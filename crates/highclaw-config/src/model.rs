// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Highclaw gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::path::PathBuf;

use highclaw_core::{DmScope, GroupActivation};
use serde::{Deserialize, Serialize};

/// Top-level Highclaw configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HighclawConfig {
    /// Agent identity settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session routing, history, and retention settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// On-disk session store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP/WebSocket gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Agent identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logical agent id; the `<agent>` segment of derived session keys.
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Inline system prompt handed to the runner.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
        }
    }
}

fn default_agent_id() -> String {
    "main".to_string()
}

fn default_agent_name() -> String {
    "highclaw".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Session routing and retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Suffix of the shared main session (`agent:<id>:<main_key>`).
    #[serde(default = "default_main_key")]
    pub main_key: String,

    /// How DM peers map onto sessions.
    #[serde(default)]
    pub dm_scope: DmScope,

    /// Canonical person id -> list of `"<channel>:<peerId>"` aliases.
    #[serde(default)]
    pub identity_links: BTreeMap<String, Vec<String>>,

    /// Number of most recent messages handed to the runner.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Per-message code point cap applied to runner history.
    #[serde(default = "default_history_max_chars")]
    pub history_max_chars: usize,

    /// How long a chat idempotency key is remembered.
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Deadline for a single runner call.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    /// Interval of the best-effort save sweep over live sessions. 0 disables.
    #[serde(default = "default_auto_save_interval_secs")]
    pub auto_save_interval_secs: u64,

    /// Interval of the stale-session prune job. 0 disables.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    /// Sessions idle longer than this are pruned. 0 disables the age bound.
    #[serde(default = "default_prune_max_age_days")]
    pub prune_max_age_days: u32,

    /// At most this many sessions are retained. 0 disables the count bound.
    #[serde(default = "default_prune_max_count")]
    pub prune_max_count: usize,

    /// Activation applied to group sessions that have not been patched.
    #[serde(default)]
    pub group_activation: GroupActivation,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            main_key: default_main_key(),
            dm_scope: DmScope::default(),
            identity_links: BTreeMap::new(),
            history_limit: default_history_limit(),
            history_max_chars: default_history_max_chars(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
            auto_save_interval_secs: default_auto_save_interval_secs(),
            prune_interval_secs: default_prune_interval_secs(),
            prune_max_age_days: default_prune_max_age_days(),
            prune_max_count: default_prune_max_count(),
            group_activation: GroupActivation::default(),
        }
    }
}

fn default_main_key() -> String {
    "main".to_string()
}

fn default_history_limit() -> usize {
    16
}

fn default_history_max_chars() -> usize {
    3000
}

fn default_idempotency_ttl_secs() -> u64 {
    300
}

fn default_reply_timeout_secs() -> u64 {
    120
}

fn default_auto_save_interval_secs() -> u64 {
    60
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_prune_max_age_days() -> u32 {
    30
}

fn default_prune_max_count() -> usize {
    500
}

/// On-disk store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory holding `sessions/` and `state/`. Defaults to `~/.highclaw`.
    #[serde(default)]
    pub root_dir: Option<String>,

    /// Unix permission bits for snapshot and state files.
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            file_mode: default_file_mode(),
        }
    }
}

impl StorageConfig {
    /// Resolve the store root: explicit setting, then `$HOME/.highclaw`,
    /// then a relative `.highclaw` when no home directory is known.
    pub fn root_path(&self) -> PathBuf {
        match self.root_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => expand_home(dir),
            _ => dirs::home_dir()
                .map(|home| home.join(".highclaw"))
                .unwrap_or_else(|| PathBuf::from(".highclaw")),
        }
    }
}

fn expand_home(dir: &str) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(dir)
}

fn default_file_mode() -> u32 {
    0o600
}

/// HTTP/WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token required on `/api/*` and `/ws`. `None` leaves them open.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// How long `/api/inbound` waits for the agent loop to answer.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    18789
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// API key. Falls back to the `ANTHROPIC_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

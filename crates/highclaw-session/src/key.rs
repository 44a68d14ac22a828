// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical session key derivation.
//!
//! Keys look like `agent:<agent>:<suffix>`. The suffix depends on whether the
//! peer is a group or a DM, and for DMs on the configured [`DmScope`].
//! Derivation is pure and total: the same inputs always yield the same key.

use std::collections::BTreeMap;

use highclaw_core::{DmScope, PeerContext, PeerKind};

pub const DEFAULT_AGENT_ID: &str = "main";
pub const DEFAULT_MAIN_KEY: &str = "main";
/// The key every unbound, unrouted conversation falls back to.
pub const DEFAULT_SESSION_KEY: &str = "agent:main:main";

const MAX_ID_LEN: usize = 64;
const DEFAULT_ACCOUNT_ID: &str = "default";
const UNKNOWN_CHANNEL: &str = "unknown";

/// Canonical person id -> `"<channel>:<peerId>"` aliases.
pub type IdentityLinks = BTreeMap<String, Vec<String>>;

/// Routing policy applied when no explicit key or binding exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPolicy {
    pub agent_id: String,
    pub main_key: String,
    pub dm_scope: DmScope,
    pub identity_links: IdentityLinks,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            agent_id: DEFAULT_AGENT_ID.to_string(),
            main_key: DEFAULT_MAIN_KEY.to_string(),
            dm_scope: DmScope::Main,
            identity_links: IdentityLinks::new(),
        }
    }
}

impl KeyPolicy {
    pub fn with_dm_scope(mut self, dm_scope: DmScope) -> Self {
        self.dm_scope = dm_scope;
        self
    }

    pub fn with_identity_links(mut self, links: IdentityLinks) -> Self {
        self.identity_links = links;
        self
    }

    /// Derive the canonical key for `peer` under this policy.
    pub fn derive(&self, peer: &PeerContext) -> String {
        derive_session_key(self, peer)
    }

    /// The shared main session for this policy's agent.
    pub fn main_session_key(&self) -> String {
        format!(
            "agent:{}:{}",
            normalize_agent_id(&self.agent_id),
            normalize_main_key(&self.main_key)
        )
    }
}

/// Produce the canonical session key for an inbound peer.
pub fn derive_session_key(policy: &KeyPolicy, peer: &PeerContext) -> String {
    let agent = normalize_agent_id(&policy.agent_id);
    let main_key = normalize_main_key(&policy.main_key);
    let channel = normalize_channel(&peer.channel);

    let group_id = normalize_id(&peer.group_id);
    let suffix = if peer.peer_kind == PeerKind::Group && !group_id.is_empty() {
        format!("{channel}:group:{group_id}")
    } else {
        direct_suffix(policy, &channel, &main_key, peer)
    };

    format!("agent:{agent}:{suffix}")
}

fn direct_suffix(policy: &KeyPolicy, channel: &str, main_key: &str, peer: &PeerContext) -> String {
    let peer_id = normalize_id(&peer.peer_id);
    if peer_id.is_empty() {
        return main_key.to_string();
    }

    match policy.dm_scope {
        DmScope::Main => main_key.to_string(),
        DmScope::PerPeer => {
            let id = linked_identity(&policy.identity_links, channel, &peer_id)
                .unwrap_or(peer_id);
            format!("direct:{id}")
        }
        DmScope::PerChannelPeer => format!("{channel}:direct:{peer_id}"),
        DmScope::PerAccountChannelPeer => {
            let account = match normalize_id(&peer.account_id) {
                a if a.is_empty() => DEFAULT_ACCOUNT_ID.to_string(),
                a => a,
            };
            format!("{channel}:{account}:direct:{peer_id}")
        }
    }
}

/// Reverse-lookup the canonical person behind `(channel, peer_id)`.
///
/// Aliases without a channel prefix match the peer on any channel.
fn linked_identity(links: &IdentityLinks, channel: &str, peer_id: &str) -> Option<String> {
    links.iter().find_map(|(canonical, aliases)| {
        let matched = aliases.iter().any(|alias| match alias.split_once(':') {
            Some((ch, id)) => normalize_channel(ch) == channel && normalize_id(id) == peer_id,
            None => normalize_id(alias) == peer_id,
        });
        let canonical = normalize_id(canonical);
        (matched && !canonical.is_empty()).then_some(canonical)
    })
}

/// Map a free-form id onto `[a-z0-9_-]`, collapsing dash runs and
/// truncating to 64 characters.
pub fn normalize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_ID_LEN));
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches('-');
    let truncated = &trimmed[..trimmed.len().min(MAX_ID_LEN)];
    truncated.trim_end_matches('-').to_string()
}

fn normalize_agent_id(raw: &str) -> String {
    match normalize_id(raw) {
        id if id.is_empty() => DEFAULT_AGENT_ID.to_string(),
        id => id,
    }
}

fn normalize_main_key(raw: &str) -> String {
    match normalize_id(raw) {
        key if key.is_empty() => DEFAULT_MAIN_KEY.to_string(),
        key => key,
    }
}

/// Trim and lowercase a channel label.
pub fn normalize_channel(raw: &str) -> String {
    match raw.trim().to_lowercase() {
        ch if ch.is_empty() => UNKNOWN_CHANNEL.to_string(),
        ch => ch,
    }
}

/// Split `agent:<agent>:<rest>` into its agent id and remainder.
pub fn parse_session_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("agent:")?;
    let (agent, suffix) = rest.split_once(':')?;
    (!agent.is_empty() && !suffix.is_empty()).then_some((agent, suffix))
}

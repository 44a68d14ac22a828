// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Highclaw workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ErrorKind;

/// Health status of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Runner,
}

// --- Conversation types ---

/// Author of a chat message. Any other role is rejected at append time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single entry in a session's message log.
///
/// `timestamp` is epoch milliseconds assigned by the session at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub timestamp: i64,
}

/// Whether the remote participant is a one-to-one DM or a multi-party room.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    #[default]
    Direct,
    Group,
    Other,
}

/// Where an inbound message came from, as reported by a channel adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerContext {
    pub channel: String,
    pub peer_id: String,
    pub peer_kind: PeerKind,
    pub group_id: String,
    pub account_id: String,
    pub conversation: String,
}

impl PeerContext {
    /// A direct-message peer on `channel`.
    pub fn direct(channel: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            peer_id: peer_id.into(),
            peer_kind: PeerKind::Direct,
            ..Self::default()
        }
    }

    /// A member `peer_id` speaking inside group `group_id`.
    pub fn group(
        channel: impl Into<String>,
        peer_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            peer_id: peer_id.into(),
            peer_kind: PeerKind::Group,
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_conversation(mut self, conversation: impl Into<String>) -> Self {
        self.conversation = conversation.into();
        self
    }

    /// True when this peer is a group member with a usable group id.
    pub fn is_group(&self) -> bool {
        self.peer_kind == PeerKind::Group && !self.group_id.trim().is_empty()
    }
}

/// How much of a DM peer's identity participates in the session key.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum DmScope {
    /// Every DM shares the agent's main session.
    #[default]
    Main,
    /// One session per person, merged across channels by identity links.
    PerPeer,
    /// One session per (channel, peer).
    PerChannelPeer,
    /// One session per (channel, account, peer).
    PerAccountChannelPeer,
}

/// Whether the bot answers every group message or only when mentioned.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupActivation {
    #[default]
    Mention,
    Always,
}

// --- Channel types ---

/// What a channel adapter reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Channel label used in session keys and bindings (e.g. `telegram`).
    pub name: String,
    /// Whether the channel can deliver group traffic.
    pub supports_groups: bool,
    /// Maximum message length in characters, if limited.
    pub max_message_length: Option<usize>,
}

/// An inbound message received from a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    pub peer: PeerContext,
    pub sender: Option<String>,
    pub text: String,
    /// Set by group-capable channels when the bot was addressed directly.
    pub mentioned: bool,
    /// An explicit session key chosen by the client, bypassing routing.
    pub session_key: Option<String>,
    /// Opaque token the originating adapter uses to pair the reply.
    pub correlation_id: Option<String>,
}

/// An outbound message to be delivered via a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub session_key: String,
    pub peer: PeerContext,
    pub content: String,
    pub correlation_id: Option<String>,
}

/// Why an inbound event produced no outbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedReply {
    /// The user turn was stored but the agent was not activated.
    Recorded { session_key: String },
    /// The event was already processed within the idempotency window.
    Duplicate,
    /// Processing failed; the user turn may already be persisted.
    Failed { kind: ErrorKind, message: String },
}

// --- Runner types ---

/// The bounded history handed to an agent runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub session_key: String,
    pub agent_id: Option<String>,
    pub model: Option<String>,
    pub thinking_level: Option<String>,
    pub history: Vec<ChatMessage>,
}

/// A runner's reply with token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReply {
    pub reply: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

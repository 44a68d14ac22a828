// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Highclaw gateway.
//!
//! This crate provides the error enum, the shared conversation and routing
//! types, and the adapter traits implemented by channels and agent runners.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, HighclawError};
pub use types::{
    AdapterType, ChannelDescriptor, ChatMessage, DmScope, GroupActivation, HealthStatus,
    InboundEvent, OutboundMessage, PeerContext, PeerKind, Role, RunReply, RunRequest,
    SkippedReply,
};

pub use traits::{AgentRunner, ChannelAdapter, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_parses_only_known_values() {
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
        assert_eq!(Role::from_str("system").unwrap(), Role::System);
        assert!(Role::from_str("tool").is_err());
        assert!(Role::from_str("").is_err());
    }

    #[test]
    fn dm_scope_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&DmScope::PerAccountChannelPeer).unwrap();
        assert_eq!(json, "\"perAccountChannelPeer\"");
        assert_eq!(DmScope::from_str("perPeer").unwrap(), DmScope::PerPeer);
        assert_eq!(DmScope::default(), DmScope::Main);
    }

    #[test]
    fn chat_message_omits_absent_optionals() {
        let msg = ChatMessage {
            role: Role::User,
            content: "hi".into(),
            channel: None,
            sender: None,
            timestamp: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "user", "content": "hi", "timestamp": 1_700_000_000_000_i64})
        );
    }

    #[test]
    fn peer_context_deserializes_partial_json() {
        let peer: PeerContext =
            serde_json::from_str(r#"{"channel":"telegram","peerId":"u1","peerKind":"group","groupId":"g9"}"#)
                .unwrap();
        assert!(peer.is_group());
        assert_eq!(peer.account_id, "");
    }

    #[test]
    fn group_without_id_is_not_group() {
        let peer = PeerContext::group("discord", "u1", "   ");
        assert!(!peer.is_group());
    }

    #[test]
    fn health_status_variants() {
        assert_eq!(HealthStatus::Healthy, HealthStatus::Healthy);
        assert_ne!(HealthStatus::Degraded("slow".into()), HealthStatus::Healthy);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_channel_adapter<T: ChannelAdapter>() {}
        fn _assert_agent_runner<T: AgentRunner>() {}
    }
}

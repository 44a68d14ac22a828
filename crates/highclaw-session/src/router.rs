// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound routing: explicit key, then admin binding, then derivation.

use highclaw_core::PeerContext;
use tracing::trace;

use crate::key::{DEFAULT_SESSION_KEY, KeyPolicy};
use crate::store::SessionStore;

/// What a caller knows about an inbound message when picking its session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRequest {
    /// A key the caller already chose; used verbatim when non-blank.
    pub session_key: Option<String>,
    pub channel: String,
    pub conversation: String,
    pub peer: PeerContext,
}

impl RouteRequest {
    /// Route by peer. The conversation defaults to the peer's own
    /// conversation id, then the group id for groups, then the peer id.
    pub fn from_peer(peer: PeerContext) -> Self {
        let conversation = if !peer.conversation.trim().is_empty() {
            peer.conversation.clone()
        } else if peer.is_group() {
            peer.group_id.clone()
        } else {
            peer.peer_id.clone()
        };
        Self {
            session_key: None,
            channel: peer.channel.clone(),
            conversation,
            peer,
        }
    }

    /// Route to a caller-chosen key.
    pub fn explicit(session_key: impl Into<String>, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        Self {
            session_key: Some(session_key.into()),
            peer: PeerContext::direct(channel.clone(), ""),
            channel,
            conversation: String::new(),
        }
    }
}

/// Stateless resolver over the store's bindings and a key policy.
#[derive(Debug, Clone, Default)]
pub struct SessionRouter {
    policy: KeyPolicy,
}

impl SessionRouter {
    pub fn new(policy: KeyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    pub async fn resolve(&self, store: &SessionStore, request: &RouteRequest) -> String {
        if let Some(key) = request
            .session_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            return key.to_string();
        }

        let bound = store
            .resolve_session(&request.channel, &request.conversation)
            .await;
        if bound != DEFAULT_SESSION_KEY {
            trace!(session_key = %bound, channel = %request.channel, "routed by binding");
            return bound;
        }

        self.policy.derive(&request.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use highclaw_core::DmScope;

    fn router(scope: DmScope) -> SessionRouter {
        SessionRouter::new(KeyPolicy::default().with_dm_scope(scope))
    }

    #[tokio::test]
    async fn explicit_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.set_binding("tui", "x", "agent:main:bound").await.unwrap();

        let request = RouteRequest::explicit(" agent:main:chosen ", "tui");
        assert_eq!(
            router(DmScope::PerPeer).resolve(&store, &request).await,
            "agent:main:chosen"
        );
    }

    #[tokio::test]
    async fn binding_beats_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.set_binding("telegram", "g1", "agent:main:ops").await.unwrap();

        let request = RouteRequest::from_peer(PeerContext::group("telegram", "u1", "g1"));
        assert_eq!(request.conversation, "g1");
        assert_eq!(
            router(DmScope::Main).resolve(&store, &request).await,
            "agent:main:ops"
        );
    }

    #[tokio::test]
    async fn derivation_when_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let request = RouteRequest::from_peer(PeerContext::direct("whatsapp", "user456"));
        assert_eq!(request.conversation, "user456");
        assert_eq!(
            router(DmScope::PerPeer).resolve(&store, &request).await,
            "agent:main:direct:user456"
        );
    }

    #[test]
    fn explicit_conversation_is_kept() {
        let peer = PeerContext::direct("slack", "u1").with_conversation("C42");
        assert_eq!(RouteRequest::from_peer(peer).conversation, "C42");
    }
}

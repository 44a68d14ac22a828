// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session contract exposed to RPC, HTTP, the shell, and channel loops.
//!
//! [`SessionManager`] owns the registry, router, and idempotency gate and
//! shares the store. Every mutation is written through before it returns.

use std::sync::Arc;
use std::time::Duration;

use highclaw_core::{ChatMessage, HighclawError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::eviction::{self, PruneReport};
use crate::idempotency::{ClaimOutcome, IdempotencyGate};
use crate::key::{KeyPolicy, parse_session_key};
use crate::registry::SessionRegistry;
use crate::router::{RouteRequest, SessionRouter};
use crate::session::{NewMessage, Session, SessionPatch, SessionSummary};
use crate::store::{CurrentSession, SessionBinding, SessionStore};

/// Outcome of a best-effort save sweep over live sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoSaveReport {
    pub saved: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct SessionManager {
    store: Arc<SessionStore>,
    registry: SessionRegistry,
    router: SessionRouter,
    idempotency: IdempotencyGate,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>, policy: KeyPolicy, idempotency_ttl: Duration) -> Self {
        Self {
            store,
            registry: SessionRegistry::new(),
            router: SessionRouter::new(policy),
            idempotency: IdempotencyGate::new(idempotency_ttl),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &KeyPolicy {
        self.router.policy()
    }

    /// Install every on-disk snapshot into the registry. Returns how many
    /// sessions were added.
    pub async fn hydrate(&self) -> Result<usize, HighclawError> {
        self.store.init().await?;
        let mut added = 0;
        for snapshot in self.store.load_all().await? {
            let key = snapshot.key.clone();
            let (_, created) = self
                .registry
                .get_or_insert_with(&key, || Session::from_snapshot(snapshot))
                .await;
            if created {
                added += 1;
            }
        }
        info!(sessions = added, root = %self.store.root().display(), "session store hydrated");
        Ok(added)
    }

    // --- Routing ---

    pub async fn resolve_session(&self, request: &RouteRequest) -> String {
        self.router.resolve(&self.store, request).await
    }

    // --- Lifecycle ---

    /// Return the live session for `key`, loading it from disk or creating
    /// (and persisting) an empty one.
    pub async fn get_or_create(
        &self,
        key: &str,
        channel: &str,
    ) -> Result<Arc<Session>, HighclawError> {
        let key = require_key(key)?;
        let (session, _) = self
            .registry
            .get_or_load(key, move || async move {
                match self.store.load(key).await {
                    Ok(session) => Ok::<_, HighclawError>(session),
                    Err(HighclawError::NotFound { .. }) => {
                        let agent = parse_session_key(key).map_or("", |(agent, _)| agent);
                        let session = Session::new(key, channel).with_agent_id(agent);
                        self.store.save(&session).await?;
                        debug!(session_key = %key, channel = %channel, "session created");
                        Ok(session)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(session)
    }

    /// Look up a live or on-disk session.
    pub async fn get(&self, key: &str) -> Result<Arc<Session>, HighclawError> {
        let key = require_key(key)?;
        let (session, _) = self
            .registry
            .get_or_load(key, move || self.store.load(key))
            .await?;
        Ok(session)
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    pub async fn count(&self) -> usize {
        self.registry.count().await
    }

    // --- Mutations (write-through) ---

    pub async fn add_message(
        &self,
        key: &str,
        msg: NewMessage,
    ) -> Result<ChatMessage, HighclawError> {
        let session = self.get(key).await?;
        let stored = session.add_message(msg).await?;
        self.store.save(&session).await?;
        Ok(stored)
    }

    pub async fn messages(&self, key: &str) -> Result<Vec<ChatMessage>, HighclawError> {
        Ok(self.get(key).await?.messages().await)
    }

    pub async fn reset(&self, key: &str) -> Result<(), HighclawError> {
        let session = self.get(key).await?;
        session.reset().await;
        self.store.save(&session).await?;
        info!(session_key = %key, "session reset");
        Ok(())
    }

    pub async fn patch(
        &self,
        key: &str,
        patch: &SessionPatch,
    ) -> Result<SessionSummary, HighclawError> {
        let session = self.get(key).await?;
        let summary = session.apply_patch(patch).await;
        self.store.save(&session).await?;
        Ok(summary)
    }

    /// Remove a session from the registry and disk. Absent keys are a no-op.
    /// Clears the current pointer if it named this session.
    ///
    /// Writers still holding the session get `NotFound` from their next save.
    pub async fn delete(&self, key: &str) -> Result<(), HighclawError> {
        let key = require_key(key)?;
        eviction::remove(&self.store, &self.registry, key).await?;
        if self
            .store
            .current()
            .await
            .ok()
            .flatten()
            .is_some_and(|c| c.key == key)
        {
            self.store.set_current("").await?;
        }
        info!(session_key = %key, "session deleted");
        Ok(())
    }

    /// Delete `key` unless it is the caller's active session.
    pub async fn delete_inactive(&self, key: &str, active_key: &str) -> Result<(), HighclawError> {
        if key.trim() == active_key.trim() {
            return Err(HighclawError::PolicyViolation(format!(
                "cannot delete the active session `{key}`"
            )));
        }
        self.delete(key).await
    }

    /// Persist an externally held history, then drop any live copy so the next
    /// access reloads the saved state.
    pub async fn save_from_history(
        &self,
        key: &str,
        channel: &str,
        agent_id: Option<&str>,
        model: Option<&str>,
        history: Vec<ChatMessage>,
    ) -> Result<(), HighclawError> {
        self.store
            .save_from_history(key, channel, agent_id, model, history)
            .await?;
        self.registry.delete(key).await;
        Ok(())
    }

    pub async fn save(&self, session: &Session) -> Result<(), HighclawError> {
        self.store.save(session).await
    }

    /// Save every live session. Failures are logged and counted, never raised.
    pub async fn save_all(&self) -> AutoSaveReport {
        let mut report = AutoSaveReport::default();
        for session in self.registry.sessions().await {
            match self.store.save(&session).await {
                Ok(()) => report.saved += 1,
                // Deleted or evicted since the sweep started.
                Err(HighclawError::NotFound { .. }) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(session_key = %session.key(), error = %e, "auto-save failed");
                }
            }
        }
        report
    }

    // --- Bindings and pointer ---

    pub async fn bind(
        &self,
        channel: &str,
        conversation: &str,
        key: &str,
    ) -> Result<(), HighclawError> {
        self.store.set_binding(channel, conversation, key).await
    }

    pub async fn unbind(&self, channel: &str, conversation: &str) -> Result<bool, HighclawError> {
        self.store.remove_binding(channel, conversation).await
    }

    pub async fn list_bindings(&self) -> Result<Vec<SessionBinding>, HighclawError> {
        self.store.list_bindings().await
    }

    pub async fn set_current(&self, key: &str) -> Result<(), HighclawError> {
        self.store.set_current(key).await
    }

    pub async fn current(&self) -> Result<Option<CurrentSession>, HighclawError> {
        self.store.current().await
    }

    // --- Idempotency and eviction ---

    pub async fn claim_idempotency(&self, key: &str) -> ClaimOutcome {
        self.idempotency.claim(key).await
    }

    pub async fn prune_stale(
        &self,
        max_age_days: u32,
        max_count: usize,
    ) -> Result<PruneReport, HighclawError> {
        eviction::prune_stale(&self.store, &self.registry, max_age_days, max_count).await
    }

    pub async fn last_session_key(&self) -> Result<Option<String>, HighclawError> {
        eviction::last_session_key(&self.store).await
    }
}

fn require_key(key: &str) -> Result<&str, HighclawError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(HighclawError::InvalidInput(
            "session key must not be empty".to_string(),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use highclaw_core::PeerContext;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let manager = SessionManager::new(
            store,
            KeyPolicy::default(),
            crate::idempotency::DEFAULT_IDEMPOTENCY_TTL,
        );
        (dir, manager)
    }

    #[tokio::test]
    async fn get_or_create_persists_new_sessions() {
        let (_dir, manager) = manager();
        let session = manager.get_or_create("agent:ops:main", "rpc").await.unwrap();

        assert!(manager.store().session_path("agent:ops:main").exists());
        assert_eq!(session.summary().await.agent_id.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn blank_key_is_invalid() {
        let (_dir, manager) = manager();
        let err = manager.get_or_create("  ", "rpc").await.unwrap_err();
        assert!(matches!(err, HighclawError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, manager) = manager();
        let err = manager.get("agent:main:nope").await.unwrap_err();
        assert!(matches!(err, HighclawError::NotFound { .. }));
        let err = manager
            .add_message("agent:main:nope", NewMessage::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, HighclawError::NotFound { .. }));
    }

    #[tokio::test]
    async fn add_message_writes_through() {
        let (_dir, manager) = manager();
        manager.get_or_create("agent:main:main", "tui").await.unwrap();
        let stored = manager
            .add_message("agent:main:main", NewMessage::user("hello"))
            .await
            .unwrap();

        let on_disk = manager.store().load_snapshot("agent:main:main").await.unwrap();
        assert_eq!(on_disk.history.last(), Some(&stored));
    }

    #[tokio::test]
    async fn delete_clears_current_pointer() {
        let (_dir, manager) = manager();
        manager.get_or_create("agent:main:a", "rpc").await.unwrap();
        manager.set_current("agent:main:a").await.unwrap();

        manager.delete("agent:main:a").await.unwrap();
        assert!(manager.current().await.unwrap().is_none());
        assert!(manager.get("agent:main:a").await.is_err());
        manager.delete("agent:main:a").await.unwrap();
    }

    #[tokio::test]
    async fn delete_trims_and_validates_the_key() {
        let (_dir, manager) = manager();
        manager.get_or_create("agent:main:a", "rpc").await.unwrap();

        manager.delete("  agent:main:a \n").await.unwrap();
        assert!(!manager.store().session_path("agent:main:a").exists());
        assert!(matches!(
            manager.get("agent:main:a").await.unwrap_err(),
            HighclawError::NotFound { .. }
        ));

        let err = manager.delete("   ").await.unwrap_err();
        assert!(matches!(err, HighclawError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn delete_inactive_refuses_active() {
        let (_dir, manager) = manager();
        manager.get_or_create("agent:main:a", "tui").await.unwrap();
        let err = manager
            .delete_inactive("agent:main:a", "agent:main:a")
            .await
            .unwrap_err();
        assert!(matches!(err, HighclawError::PolicyViolation(_)));
        assert!(manager.get("agent:main:a").await.is_ok());
    }

    #[tokio::test]
    async fn save_from_history_replaces_live_copy() {
        let (_dir, manager) = manager();
        manager.get_or_create("agent:main:tui", "tui").await.unwrap();
        let history = vec![ChatMessage {
            role: highclaw_core::Role::User,
            content: "from history".into(),
            channel: None,
            sender: None,
            timestamp: 1,
        }];
        manager
            .save_from_history("agent:main:tui", "tui", None, None, history)
            .await
            .unwrap();

        let messages = manager.messages("agent:main:tui").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "from history");
        assert_eq!(manager.current().await.unwrap().unwrap().key, "agent:main:tui");
    }

    #[tokio::test]
    async fn resolve_uses_policy() {
        let (_dir, manager) = manager();
        let request = RouteRequest::from_peer(PeerContext::direct("whatsapp", "123456789"));
        assert_eq!(manager.resolve_session(&request).await, "agent:main:main");
    }

    #[tokio::test]
    async fn save_all_counts_sessions() {
        let (_dir, manager) = manager();
        manager.get_or_create("a", "rpc").await.unwrap();
        manager.get_or_create("b", "rpc").await.unwrap();
        assert_eq!(
            manager.save_all().await,
            AutoSaveReport { saved: 2, failed: 0 }
        );
    }
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a chat pipeline over a temp session store with a
//! [`MockRunner`], so tests can drive routing, persistence and replies
//! through the same path the gateway and channel loop use.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use highclaw_agent::{ChatConfig, ChatOutcome, ChatRequest, ChatService, build_session_manager};
use highclaw_config::HighclawConfig;
use highclaw_core::{DmScope, GroupActivation, HighclawError, PeerContext};
use highclaw_session::SessionManager;

use crate::mock_runner::MockRunner;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<String>,
    config: HighclawConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            config: HighclawConfig::default(),
        }
    }

    /// Set mock runner replies.
    pub fn with_replies(mut self, replies: Vec<String>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_dm_scope(mut self, dm_scope: DmScope) -> Self {
        self.config.session.dm_scope = dm_scope;
        self
    }

    /// Link `aliases` (`"<channel>:<peerId>"`) to one canonical person.
    pub fn with_identity_link(mut self, canonical: &str, aliases: &[&str]) -> Self {
        self.config.session.identity_links.insert(
            canonical.to_string(),
            aliases.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.config.session.history_limit = limit;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.reply_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_group_activation(mut self, activation: GroupActivation) -> Self {
        self.config.session.group_activation = activation;
        self
    }

    /// Build the harness, creating a temp store root.
    pub async fn build(self) -> Result<TestHarness, HighclawError> {
        let temp_dir = tempfile::TempDir::new()
            .map_err(|e| HighclawError::storage("create temp store root", e))?;

        let mut config = self.config;
        config.storage.root_dir = Some(temp_dir.path().display().to_string());

        let sessions = Arc::new(build_session_manager(&config));
        sessions.hydrate().await?;

        let runner = Arc::new(MockRunner::with_replies(self.replies));
        let chat = Arc::new(ChatService::new(
            sessions.clone(),
            runner.clone(),
            ChatConfig::from_config(&config),
        ));

        Ok(TestHarness {
            runner,
            sessions,
            chat,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete chat pipeline with a mock runner and a temp store.
pub struct TestHarness {
    pub runner: Arc<MockRunner>,
    pub sessions: Arc<SessionManager>,
    pub chat: Arc<ChatService>,
    pub config: HighclawConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Send `text` to an explicit session.
    pub async fn send(&self, session_key: &str, text: &str) -> Result<ChatOutcome, HighclawError> {
        self.chat
            .send(ChatRequest::to_session(session_key, "rpc", text))
            .await
    }

    /// Send `text` as `peer`, letting the router pick the session.
    pub async fn send_from(
        &self,
        peer: PeerContext,
        text: &str,
    ) -> Result<ChatOutcome, HighclawError> {
        self.chat.send(ChatRequest::from_peer(peer, text)).await
    }

    /// A fresh manager over the same store root, hydrated from disk, as a
    /// restarted process would see it.
    pub async fn reopen(&self) -> Result<Arc<SessionManager>, HighclawError> {
        let sessions = Arc::new(build_session_manager(&self.config));
        sessions.hydrate().await?;
        Ok(sessions)
    }
}

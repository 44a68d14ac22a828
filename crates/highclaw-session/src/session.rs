// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory session object and its JSON snapshot form.
//!
//! A [`Session`] owns one ordered message log guarded by its own mutex. The
//! snapshot emits that log as `history`; there is no second copy to keep in sync.

use chrono::{DateTime, Utc};
use highclaw_core::{ChatMessage, GroupActivation, HighclawError, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// A message as submitted by a caller, before validation and stamping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

impl NewMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            channel: None,
            sender: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

/// Metadata overrides accepted by `patch`. Blank strings are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPatch {
    pub model: Option<String>,
    pub thinking_level: Option<String>,
    pub verbose_level: Option<String>,
    pub agent_id: Option<String>,
    pub group_activation: Option<GroupActivation>,
}

/// Read-only view of a session used by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub key: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_activation: Option<GroupActivation>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// The on-disk JSON document for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub key: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_level: Option<String>,
    #[serde(default)]
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_activation: Option<GroupActivation>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Mutable state behind a session's lock.
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    channel: String,
    agent_id: Option<String>,
    model: Option<String>,
    thinking_level: Option<String>,
    verbose_level: Option<String>,
    group_activation: Option<GroupActivation>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
    // Set once the session is deleted or evicted; its snapshot must not be rewritten.
    removed: bool,
}

impl SessionState {
    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed
    }

    /// Advance the activity clock, never moving it backwards.
    fn touch(&mut self) -> DateTime<Utc> {
        let now = now_millis().max(self.last_activity_at);
        self.last_activity_at = now;
        now
    }

    pub(crate) fn to_snapshot(&self, key: &str) -> SessionSnapshot {
        SessionSnapshot {
            key: key.to_string(),
            channel: self.channel.clone(),
            agent_id: self.agent_id.clone(),
            model: self.model.clone(),
            thinking_level: self.thinking_level.clone(),
            verbose_level: self.verbose_level.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            group_activation: self.group_activation,
            history: self.messages.clone(),
        }
    }

    fn summary(&self, key: &str) -> SessionSummary {
        SessionSummary {
            key: key.to_string(),
            channel: self.channel.clone(),
            agent_id: self.agent_id.clone(),
            model: self.model.clone(),
            thinking_level: self.thinking_level.clone(),
            verbose_level: self.verbose_level.clone(),
            group_activation: self.group_activation,
            message_count: self.messages.len(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// A live conversation. The key is immutable; everything else sits behind the lock.
#[derive(Debug)]
pub struct Session {
    key: String,
    state: Mutex<SessionState>,
}

impl Session {
    /// A fresh, empty session created now.
    pub fn new(key: impl Into<String>, channel: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            key: key.into(),
            state: Mutex::new(SessionState {
                channel: channel.into(),
                agent_id: None,
                model: None,
                thinking_level: None,
                verbose_level: None,
                group_activation: None,
                created_at: now,
                last_activity_at: now,
                messages: Vec::new(),
                removed: false,
            }),
        }
    }

    /// Rebuild a session from its decoded snapshot.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            key: snapshot.key,
            state: Mutex::new(SessionState {
                channel: snapshot.channel,
                agent_id: snapshot.agent_id,
                model: snapshot.model,
                thinking_level: snapshot.thinking_level,
                verbose_level: snapshot.verbose_level,
                group_activation: snapshot.group_activation,
                created_at: snapshot.created_at,
                last_activity_at: snapshot.last_activity_at.max(snapshot.created_at),
                messages: snapshot.history,
                removed: false,
            }),
        }
    }

    /// Set the owning agent before the session is shared.
    pub fn with_agent_id(mut self, agent_id: &str) -> Self {
        overwrite_if_present(&mut self.state.get_mut().agent_id, Some(agent_id));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hold the session lock, e.g. across snapshot encoding and the file write.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Validate, stamp, and append a message. Returns the stored message.
    pub async fn add_message(&self, msg: NewMessage) -> Result<ChatMessage, HighclawError> {
        let role = parse_role(&msg.role)?;
        let content = msg.content.trim();
        if content.is_empty() {
            return Err(HighclawError::InvalidInput(
                "message content must not be empty".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let now = state.touch();
        let stored = ChatMessage {
            role,
            content: content.to_string(),
            channel: non_blank(msg.channel),
            sender: non_blank(msg.sender),
            timestamp: now.timestamp_millis(),
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    /// A copy of the message log; later appends do not affect it.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Clear the log. `createdAt` and metadata survive.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.messages.clear();
        state.touch();
    }

    /// Apply non-blank metadata overrides under one lock acquisition.
    pub async fn apply_patch(&self, patch: &SessionPatch) -> SessionSummary {
        let mut state = self.state.lock().await;
        overwrite_if_present(&mut state.model, patch.model.as_deref());
        overwrite_if_present(&mut state.thinking_level, patch.thinking_level.as_deref());
        overwrite_if_present(&mut state.verbose_level, patch.verbose_level.as_deref());
        overwrite_if_present(&mut state.agent_id, patch.agent_id.as_deref());
        if let Some(activation) = patch.group_activation {
            state.group_activation = Some(activation);
        }
        state.summary(&self.key)
    }

    pub async fn set_model(&self, model: &str) {
        overwrite_if_present(&mut self.state.lock().await.model, Some(model));
    }

    pub async fn set_thinking_level(&self, level: &str) {
        overwrite_if_present(&mut self.state.lock().await.thinking_level, Some(level));
    }

    pub async fn set_verbose_level(&self, level: &str) {
        overwrite_if_present(&mut self.state.lock().await.verbose_level, Some(level));
    }

    pub async fn set_agent_id(&self, agent_id: &str) {
        overwrite_if_present(&mut self.state.lock().await.agent_id, Some(agent_id));
    }

    pub async fn group_activation(&self) -> Option<GroupActivation> {
        self.state.lock().await.group_activation
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.to_snapshot(&self.key)
    }

    pub async fn summary(&self) -> SessionSummary {
        self.state.lock().await.summary(&self.key)
    }
}

fn parse_role(raw: &str) -> Result<Role, HighclawError> {
    raw.trim()
        .to_ascii_lowercase()
        .parse::<Role>()
        .map_err(|_| HighclawError::InvalidInput(format!("invalid role `{raw}`")))
}

fn overwrite_if_present(slot: &mut Option<String>, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        *slot = Some(v.to_string());
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Current UTC time truncated to millisecond precision.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

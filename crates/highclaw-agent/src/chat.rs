// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat pipeline: dedupe, route, record, run, record.
//!
//! [`ChatService::send`] is the single path every surface (channel loop,
//! REST, JSON-RPC, shell) uses to turn a user message into a reply. The user
//! turn is persisted before the runner is called, so a failed or timed-out
//! run never loses what the user said.

use std::sync::Arc;
use std::time::Duration;

use highclaw_config::HighclawConfig;
use highclaw_core::{
    AgentRunner, ChatMessage, GroupActivation, HighclawError, InboundEvent, PeerContext,
    RunRequest,
};
use highclaw_session::{ClaimOutcome, NewMessage, RouteRequest, SessionManager};
use tracing::{debug, info, warn};

/// Limits applied by the chat pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Only the most recent `history_limit` messages reach the runner.
    pub history_limit: usize,
    /// Each message handed to the runner is cut to this many characters.
    pub history_max_chars: usize,
    pub reply_timeout: Duration,
    /// Activation for group sessions that carry no override.
    pub group_activation: GroupActivation,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from_config(&HighclawConfig::default())
    }
}

impl ChatConfig {
    pub fn from_config(config: &HighclawConfig) -> Self {
        Self {
            history_limit: config.session.history_limit,
            history_max_chars: config.session.history_max_chars,
            reply_timeout: Duration::from_secs(config.session.reply_timeout_secs),
            group_activation: config.session.group_activation,
        }
    }
}

/// A user message entering the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    /// Caller-chosen session; skips bindings and derivation when set.
    pub session_key: Option<String>,
    pub peer: PeerContext,
    pub sender: Option<String>,
    pub text: String,
    pub mentioned: bool,
    pub idempotency_key: Option<String>,
}

impl ChatRequest {
    /// A message addressed to a known session, as sent by RPC or the shell.
    pub fn to_session(
        session_key: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_key: Some(session_key.into()),
            peer: PeerContext::direct(channel, ""),
            text: text.into(),
            ..Self::default()
        }
    }

    /// A message from `peer`, routed by binding or derivation.
    pub fn from_peer(peer: PeerContext, text: impl Into<String>) -> Self {
        Self {
            peer,
            text: text.into(),
            ..Self::default()
        }
    }

    /// Build a request from a channel event. The event id, scoped by
    /// channel, doubles as the idempotency key so redelivered events are
    /// dropped.
    pub fn from_event(event: &InboundEvent) -> Self {
        let idempotency_key = Some(event.id.trim())
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}:{id}", event.peer.channel));
        Self {
            session_key: event.session_key.clone(),
            peer: event.peer.clone(),
            sender: event.sender.clone(),
            text: event.text.clone(),
            mentioned: event.mentioned,
            idempotency_key,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn mentioned(mut self, mentioned: bool) -> Self {
        self.mentioned = mentioned;
        self
    }

    fn route(&self) -> RouteRequest {
        RouteRequest {
            session_key: self.session_key.clone(),
            ..RouteRequest::from_peer(self.peer.clone())
        }
    }
}

/// What [`ChatService::send`] did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The idempotency key was seen recently; nothing was recorded.
    Duplicate,
    /// The user turn was stored but the agent stayed silent.
    Recorded { session_key: String },
    Replied {
        session_key: String,
        reply: String,
        tokens_in: u32,
        tokens_out: u32,
    },
}

impl ChatOutcome {
    pub fn session_key(&self) -> Option<&str> {
        match self {
            Self::Duplicate => None,
            Self::Recorded { session_key } | Self::Replied { session_key, .. } => {
                Some(session_key)
            }
        }
    }
}

pub struct ChatService {
    sessions: Arc<SessionManager>,
    runner: Arc<dyn AgentRunner>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        sessions: Arc<SessionManager>,
        runner: Arc<dyn AgentRunner>,
        config: ChatConfig,
    ) -> Self {
        Self {
            sessions,
            runner,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub async fn send(&self, request: ChatRequest) -> Result<ChatOutcome, HighclawError> {
        if request.text.trim().is_empty() {
            return Err(HighclawError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        if let Some(id) = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            && self.sessions.claim_idempotency(id).await == ClaimOutcome::Duplicate
        {
            info!(idempotency_key = %id, "duplicate message dropped");
            return Ok(ChatOutcome::Duplicate);
        }

        let session_key = self.sessions.resolve_session(&request.route()).await;
        let channel = request.peer.channel.trim().to_string();
        let session = self.sessions.get_or_create(&session_key, &channel).await?;

        let mut user_turn = NewMessage::user(request.text.as_str()).with_channel(&channel);
        if let Some(sender) = request.sender.as_deref() {
            user_turn = user_turn.with_sender(sender);
        }
        self.sessions.add_message(&session_key, user_turn).await?;

        let activation = session
            .group_activation()
            .await
            .unwrap_or(self.config.group_activation);
        if request.peer.is_group() && !request.mentioned && activation == GroupActivation::Mention
        {
            debug!(session_key = %session_key, "group message recorded without mention");
            return Ok(ChatOutcome::Recorded { session_key });
        }

        let summary = session.summary().await;
        let run = RunRequest {
            session_key: session_key.clone(),
            agent_id: summary.agent_id,
            model: summary.model,
            thinking_level: summary.thinking_level,
            history: trim_history(
                session.messages().await,
                self.config.history_limit,
                self.config.history_max_chars,
            ),
        };

        let reply = match tokio::time::timeout(self.config.reply_timeout, self.runner.run(run)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(session_key = %session_key, error = %e, "runner failed");
                return Err(e);
            }
            Err(_) => {
                warn!(
                    session_key = %session_key,
                    timeout_secs = self.config.reply_timeout.as_secs(),
                    "runner timed out"
                );
                return Err(HighclawError::Timeout {
                    duration: self.config.reply_timeout,
                });
            }
        };

        if reply.reply.trim().is_empty() {
            return Err(HighclawError::runner("runner returned an empty reply"));
        }

        self.sessions
            .add_message(
                &session_key,
                NewMessage::assistant(reply.reply.as_str()).with_channel(&channel),
            )
            .await?;
        self.sessions.set_current(&session_key).await?;

        info!(
            session_key = %session_key,
            tokens_in = reply.tokens_in,
            tokens_out = reply.tokens_out,
            "reply recorded"
        );

        Ok(ChatOutcome::Replied {
            session_key,
            reply: reply.reply,
            tokens_in: reply.tokens_in,
            tokens_out: reply.tokens_out,
        })
    }
}

/// Keep the last `limit` messages, cutting each to `max_chars` characters.
pub fn trim_history(messages: Vec<ChatMessage>, limit: usize, max_chars: usize) -> Vec<ChatMessage> {
    let skip = messages.len().saturating_sub(limit);
    messages
        .into_iter()
        .skip(skip)
        .map(|mut msg| {
            if let Some((cut, _)) = msg.content.char_indices().nth(max_chars) {
                msg.content.truncate(cut);
            }
            msg
        })
        .collect()
}

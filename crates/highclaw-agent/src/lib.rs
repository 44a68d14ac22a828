// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent loop and chat pipeline for the Highclaw gateway.
//!
//! The [`AgentLoop`] is the central coordinator that:
//! - Receives events from a channel adapter (usually a [`ChannelMultiplexer`])
//! - Hands each one to the [`ChatService`] for routing, persistence and a reply
//! - Delivers replies back through the originating channel
//! - Stops cleanly when the shared cancellation token fires

pub mod channel_mux;
pub mod chat;
pub mod maintenance;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use highclaw_config::HighclawConfig;
use highclaw_core::{ChannelAdapter, HighclawError, InboundEvent, OutboundMessage, SkippedReply};
use highclaw_session::{KeyPolicy, SessionManager, SessionStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use channel_mux::ChannelMultiplexer;
pub use chat::{ChatConfig, ChatOutcome, ChatRequest, ChatService};
pub use maintenance::{MaintenanceConfig, spawn_maintenance};

/// Build the session manager described by `config`: store root and file
/// mode, routing policy, and idempotency window.
pub fn build_session_manager(config: &HighclawConfig) -> SessionManager {
    let store = SessionStore::new(config.storage.root_path())
        .with_file_mode(config.storage.file_mode);
    let policy = KeyPolicy {
        agent_id: config.agent.id.clone(),
        main_key: config.session.main_key.clone(),
        dm_scope: config.session.dm_scope,
        identity_links: config.session.identity_links.clone(),
    };
    SessionManager::new(
        Arc::new(store),
        policy,
        Duration::from_secs(config.session.idempotency_ttl_secs),
    )
}

/// Pumps channel events through the chat pipeline until cancelled.
pub struct AgentLoop {
    channel: Box<dyn ChannelAdapter>,
    chat: Arc<ChatService>,
}

impl AgentLoop {
    pub fn new(channel: Box<dyn ChannelAdapter>, chat: Arc<ChatService>) -> Self {
        info!(channel = channel.name(), "agent loop initialized");
        Self { channel, chat }
    }

    /// Runs the main agent loop until the cancellation token is triggered
    /// or the channel closes.
    ///
    /// Per-event failures are logged and reported to the channel; they never
    /// stop the loop.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), HighclawError> {
        info!("agent loop running");

        loop {
            tokio::select! {
                event = self.channel.receive() => {
                    match event {
                        Ok(event) => self.handle_inbound(event).await,
                        Err(e) if channel_mux::is_closed(&e) => {
                            info!("channel closed, stopping agent loop");
                            break;
                        }
                        Err(e) => error!(error = %e, "channel receive error"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping agent loop");
                    break;
                }
            }
        }

        self.channel.shutdown().await?;
        info!("agent loop stopped");
        Ok(())
    }

    async fn handle_inbound(&self, event: InboundEvent) {
        debug!(
            event_id = %event.id,
            channel = %event.peer.channel,
            "handling inbound event"
        );

        let skipped = match self.chat.send(ChatRequest::from_event(&event)).await {
            Ok(ChatOutcome::Replied {
                session_key, reply, ..
            }) => {
                let out = OutboundMessage {
                    channel: event.peer.channel.clone(),
                    session_key,
                    peer: event.peer.clone(),
                    content: reply,
                    correlation_id: event.correlation_id.clone(),
                };
                if let Err(e) = self.channel.deliver(out).await {
                    error!(error = %e, channel = %event.peer.channel, "failed to deliver reply");
                }
                return;
            }
            Ok(ChatOutcome::Recorded { session_key }) => SkippedReply::Recorded { session_key },
            Ok(ChatOutcome::Duplicate) => SkippedReply::Duplicate,
            Err(e) => {
                error!(error = %e, event_id = %event.id, "failed to handle inbound event");
                SkippedReply::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        if let Err(e) = self.channel.skip(&event, skipped).await {
            warn!(error = %e, "channel rejected skip notification");
        }
    }
}

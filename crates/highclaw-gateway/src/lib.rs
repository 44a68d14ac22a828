// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for Highclaw.
//!
//! The REST and JSON-RPC surfaces call the session manager and chat pipeline
//! directly. `POST /api/inbound` is different: it is the webhook channel.
//! External bridges post a `PeerContext` and text, the event travels through
//! the agent loop like any channel traffic, and the HTTP caller is held until
//! [`GatewayChannel`] receives the reply (or the skip notice) for it.

pub mod auth;
pub mod handlers;
pub mod rpc;
pub mod server;
pub mod webhook;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use highclaw_agent::ChatService;
use highclaw_config::HighclawConfig;
use highclaw_core::{
    AdapterType, ChannelAdapter, ChannelDescriptor, HealthStatus, HighclawError, InboundEvent,
    OutboundMessage, PluginAdapter, SkippedReply,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthConfig;
use crate::server::{GatewayState, PruneLimits, ServerConfig};
use crate::webhook::{Webhook, WebhookReply};

pub use server::build_router;

/// Capacity of the queue between HTTP handlers and the agent loop.
const INBOUND_QUEUE: usize = 256;
/// How long `shutdown` waits for in-flight requests to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway channel adapter configuration.
#[derive(Clone)]
pub struct GatewayChannelConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Bearer token for auth.
    pub bearer_token: Option<String>,
    /// How long `/api/inbound` waits for the agent loop.
    pub reply_timeout: Duration,
    /// Defaults for prune requests that omit a bound.
    pub prune: PruneLimits,
}

impl GatewayChannelConfig {
    pub fn from_config(config: &HighclawConfig) -> Self {
        Self {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
            bearer_token: config.gateway.bearer_token.clone(),
            reply_timeout: Duration::from_secs(config.gateway.reply_timeout_secs),
            prune: PruneLimits {
                max_age_days: config.session.prune_max_age_days,
                max_count: config.session.prune_max_count,
            },
        }
    }
}

impl std::fmt::Debug for GatewayChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayChannelConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .field("reply_timeout", &self.reply_timeout)
            .field("prune", &self.prune)
            .finish()
    }
}

/// HTTP/WebSocket gateway implementing ChannelAdapter.
///
/// `connect` binds the listener and serves in a background task until the
/// cancellation token fires or `shutdown` is called. Only webhook events are
/// produced by `receive`; REST and RPC chat calls bypass the agent loop.
pub struct GatewayChannel {
    config: GatewayChannelConfig,
    chat: Arc<ChatService>,
    cancel: CancellationToken,
    webhook: Webhook,
    inbound_rx: Mutex<mpsc::Receiver<InboundEvent>>,
    server_handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: Option<SocketAddr>,
    start_time: std::time::Instant,
}

impl GatewayChannel {
    /// Create a new GatewayChannel. The server stops when `cancel` fires.
    pub fn new(
        config: GatewayChannelConfig,
        chat: Arc<ChatService>,
        cancel: &CancellationToken,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let webhook = Webhook::new(inbound_tx, Arc::new(DashMap::new()), config.reply_timeout);
        Self {
            config,
            chat,
            cancel: cancel.child_token(),
            webhook,
            inbound_rx: Mutex::new(inbound_rx),
            server_handle: Mutex::new(None),
            local_addr: None,
            start_time: std::time::Instant::now(),
        }
    }

    /// Shared handler state, as served by `connect`.
    pub fn state(&self) -> GatewayState {
        GatewayState {
            chat: Arc::clone(&self.chat),
            webhook: self.webhook.clone(),
            auth: AuthConfig::new(self.config.bearer_token.clone()),
            prune: self.config.prune,
            start_time: self.start_time,
        }
    }

    /// The bound address once connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn complete(&self, correlation_id: Option<&str>, reply: WebhookReply) {
        let Some(correlation_id) = correlation_id else {
            tracing::warn!("gateway reply without correlation id");
            return;
        };
        if !self.webhook.complete(correlation_id, reply) {
            tracing::warn!(
                correlation_id = %correlation_id,
                "no webhook caller waiting, reply dropped"
            );
        }
    }
}

#[async_trait]
impl PluginAdapter for GatewayChannel {
    fn name(&self) -> &str {
        "gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, HighclawError> {
        let handle = self.server_handle.lock().await;
        match handle.as_ref() {
            Some(h) if !h.is_finished() => Ok(HealthStatus::Healthy),
            Some(_) => Ok(HealthStatus::Unhealthy("server stopped".to_string())),
            None => Ok(HealthStatus::Unhealthy("server not started".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), HighclawError> {
        self.cancel.cancel();
        let handle = self.server_handle.lock().await.take();
        if let Some(handle) = handle
            && tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err()
        {
            tracing::warn!("gateway server did not drain in time");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for GatewayChannel {
    fn describe(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            name: "gateway".to_string(),
            supports_groups: true,
            max_message_length: None,
        }
    }

    async fn connect(&mut self) -> Result<(), HighclawError> {
        let server_config = ServerConfig {
            host: self.config.host.clone(),
            port: self.config.port,
        };
        let listener = server::bind(&server_config).await?;
        self.local_addr = listener.local_addr().ok();

        let state = self.state();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server::serve(listener, state, cancel).await {
                tracing::error!(error = %e, "gateway server error");
            }
        });
        *self.server_handle.lock().await = Some(handle);

        tracing::info!(
            addr = ?self.local_addr,
            auth = self.config.bearer_token.is_some(),
            "gateway channel connected"
        );
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, HighclawError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| HighclawError::Channel {
            message: "gateway inbound channel closed".to_string(),
            source: None,
        })
    }

    async fn deliver(&self, msg: OutboundMessage) -> Result<(), HighclawError> {
        self.complete(
            msg.correlation_id.as_deref(),
            WebhookReply::Replied {
                session_key: msg.session_key,
                reply: msg.content,
            },
        );
        Ok(())
    }

    async fn skip(&self, event: &InboundEvent, reason: SkippedReply) -> Result<(), HighclawError> {
        self.complete(event.correlation_id.as_deref(), WebhookReply::Skipped(reason));
        Ok(())
    }
}

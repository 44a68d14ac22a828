// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel multiplexer that aggregates multiple ChannelAdapters into one.
//!
//! The multiplexer spawns per-channel receive tasks that forward inbound
//! events to a shared mpsc channel, stamping each event's peer with the
//! registered channel name. Outbound messages are routed back by that name.

use std::sync::Arc;

use async_trait::async_trait;
use highclaw_core::{
    AdapterType, ChannelAdapter, ChannelDescriptor, HealthStatus, HighclawError, InboundEvent,
    OutboundMessage, PluginAdapter, SkippedReply,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Error message returned by `receive` once every source has stopped.
pub const CLOSED_MESSAGE: &str = "multiplexer inbound channel closed";

pub struct ChannelMultiplexer {
    /// Named child channels, stored before connect().
    pending_channels: Vec<(String, Box<dyn ChannelAdapter>)>,
    /// Connected child channels (moved here after connect()).
    connected_channels: Arc<Vec<(String, Arc<dyn ChannelAdapter>)>>,
    inbound_rx: Mutex<mpsc::Receiver<InboundEvent>>,
    /// Dropped after connect() so the receiver closes once all tasks end.
    inbound_tx: Option<mpsc::Sender<InboundEvent>>,
}

impl Default for ChannelMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelMultiplexer {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(512);
        Self {
            pending_channels: Vec::new(),
            connected_channels: Arc::new(Vec::new()),
            inbound_rx: Mutex::new(inbound_rx),
            inbound_tx: Some(inbound_tx),
        }
    }

    /// Add a named channel. Must be called before `connect()`; the name is
    /// the channel label used for session keys and reply routing.
    pub fn add_channel(&mut self, name: impl Into<String>, channel: Box<dyn ChannelAdapter>) {
        self.pending_channels.push((name.into(), channel));
    }

    /// Number of channels registered (pending + connected).
    pub fn channel_count(&self) -> usize {
        self.pending_channels.len() + self.connected_channels.len()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn ChannelAdapter>> {
        let connected = &self.connected_channels;
        connected
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, channel)| channel)
            .or_else(|| (connected.len() == 1).then(|| &connected[0].1))
    }
}

#[async_trait]
impl PluginAdapter for ChannelMultiplexer {
    fn name(&self) -> &str {
        "multiplexer"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, HighclawError> {
        let mut reasons = Vec::new();
        for (name, channel) in self.connected_channels.iter() {
            match channel.health_check().await? {
                HealthStatus::Healthy => {}
                HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                    reasons.push(format!("{name}: {reason}"));
                }
            }
        }

        if reasons.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(reasons.join("; ")))
        }
    }

    async fn shutdown(&self) -> Result<(), HighclawError> {
        for (name, channel) in self.connected_channels.iter() {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = %name, error = %e, "channel shutdown error");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for ChannelMultiplexer {
    fn describe(&self) -> ChannelDescriptor {
        let mut descriptor = ChannelDescriptor {
            name: "multiplexer".to_string(),
            supports_groups: false,
            max_message_length: None,
        };
        for (_, channel) in self.connected_channels.iter() {
            let child = channel.describe();
            descriptor.supports_groups |= child.supports_groups;
            descriptor.max_message_length = match (
                descriptor.max_message_length,
                child.max_message_length,
            ) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        descriptor
    }

    async fn connect(&mut self) -> Result<(), HighclawError> {
        let tx = self.inbound_tx.take().ok_or_else(|| {
            HighclawError::Internal("channel multiplexer already connected".to_string())
        })?;
        let mut connected: Vec<(String, Arc<dyn ChannelAdapter>)> = Vec::new();

        for (name, mut channel) in std::mem::take(&mut self.pending_channels) {
            channel.connect().await?;
            info!(channel = %name, "channel connected via multiplexer");

            let channel: Arc<dyn ChannelAdapter> = Arc::from(channel);
            connected.push((name.clone(), channel.clone()));

            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match channel.receive().await {
                        Ok(mut event) => {
                            event.peer.channel = name.clone();
                            if tx.send(event).await.is_err() {
                                // Multiplexer was dropped.
                                break;
                            }
                        }
                        Err(e) if is_closed(&e) => {
                            info!(channel = %name, "channel closed, stopping receive task");
                            break;
                        }
                        Err(e) => {
                            warn!(channel = %name, error = %e, "channel receive error");
                        }
                    }
                }
            });
        }

        self.connected_channels = Arc::new(connected);
        info!(
            channels = self.connected_channels.len(),
            "channel multiplexer connected"
        );
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, HighclawError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| HighclawError::Channel {
            message: CLOSED_MESSAGE.to_string(),
            source: None,
        })
    }

    async fn deliver(&self, msg: OutboundMessage) -> Result<(), HighclawError> {
        match self.find(&msg.channel) {
            Some(channel) => channel.deliver(msg).await,
            None => {
                warn!(target_channel = %msg.channel, "no matching channel for outbound message");
                Ok(())
            }
        }
    }

    async fn skip(&self, event: &InboundEvent, reason: SkippedReply) -> Result<(), HighclawError> {
        match self.find(&event.peer.channel) {
            Some(channel) => channel.skip(event, reason).await,
            None => Ok(()),
        }
    }
}

/// True when `err` reports that a channel will never produce another event.
pub fn is_closed(err: &HighclawError) -> bool {
    matches!(err, HighclawError::Channel { message, .. } if message.contains("closed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use highclaw_core::PeerContext;
    use highclaw_test_utils::MockChannel;

    fn event(text: &str) -> InboundEvent {
        InboundEvent {
            id: "e-1".into(),
            peer: PeerContext::direct("", "u1"),
            sender: None,
            text: text.into(),
            mentioned: false,
            session_key: None,
            correlation_id: None,
        }
    }

    fn outbound(channel: &str) -> OutboundMessage {
        OutboundMessage {
            channel: channel.into(),
            session_key: "agent:main:main".into(),
            peer: PeerContext::direct(channel, "u1"),
            content: "reply".into(),
            correlation_id: None,
        }
    }

    #[test]
    fn multiplexer_new() {
        let mux = ChannelMultiplexer::new();
        assert_eq!(mux.name(), "multiplexer");
        assert_eq!(mux.adapter_type(), AdapterType::Channel);
        assert_eq!(mux.channel_count(), 0);
    }

    #[tokio::test]
    async fn multiplexer_empty_health_check() {
        let mux = ChannelMultiplexer::new();
        assert_eq!(mux.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn events_are_stamped_with_channel_name() {
        let telegram = MockChannel::new();
        let handle = telegram.clone();
        let mut mux = ChannelMultiplexer::new();
        mux.add_channel("telegram", Box::new(telegram));
        mux.connect().await.unwrap();

        handle.inject(event("hello")).await;
        let received = mux.receive().await.unwrap();

        assert_eq!(received.peer.channel, "telegram");
        assert_eq!(received.text, "hello");
    }

    #[tokio::test]
    async fn deliver_routes_by_channel_name() {
        let telegram = MockChannel::new();
        let discord = MockChannel::new();
        let (tg, dc) = (telegram.clone(), discord.clone());
        let mut mux = ChannelMultiplexer::new();
        mux.add_channel("telegram", Box::new(telegram));
        mux.add_channel("discord", Box::new(discord));
        mux.connect().await.unwrap();

        mux.deliver(outbound("discord")).await.unwrap();
        mux.deliver(outbound("irc")).await.unwrap();

        assert_eq!(tg.delivered_count().await, 0);
        assert_eq!(dc.delivered_count().await, 1);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let mut mux = ChannelMultiplexer::new();
        mux.connect().await.unwrap();
        assert!(mux.connect().await.is_err());
    }

    #[tokio::test]
    async fn receive_reports_closed_when_no_sources() {
        let mut mux = ChannelMultiplexer::new();
        mux.connect().await.unwrap();
        let err = mux.receive().await.unwrap_err();
        assert!(is_closed(&err));
    }
}

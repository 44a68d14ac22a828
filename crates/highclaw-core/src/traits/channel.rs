// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for messaging platform integrations.

use async_trait::async_trait;

use crate::error::HighclawError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelDescriptor, InboundEvent, OutboundMessage, SkippedReply};

/// Adapter for a messaging channel (Telegram, Discord, the gateway webhook, ...).
///
/// Channels produce [`InboundEvent`]s carrying a `PeerContext`; session routing
/// never needs to know the concrete platform.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Describes the channel's label and limits.
    fn describe(&self) -> ChannelDescriptor;

    /// Establishes the connection to the messaging platform.
    async fn connect(&mut self) -> Result<(), HighclawError>;

    /// Waits for the next inbound event.
    async fn receive(&self) -> Result<InboundEvent, HighclawError>;

    /// Delivers a reply back to the platform.
    async fn deliver(&self, msg: OutboundMessage) -> Result<(), HighclawError>;

    /// Notified when `event` will not get a reply. Channels that hold a
    /// caller open until the reply arrives release it here.
    async fn skip(&self, event: &InboundEvent, reason: SkippedReply) -> Result<(), HighclawError> {
        let _ = (event, reason);
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with injectable inbound events
//! and captured deliveries. Clones share state, so a test can keep a probe
//! after boxing the channel into an agent loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use highclaw_core::{
    AdapterType, ChannelAdapter, ChannelDescriptor, HealthStatus, HighclawError, InboundEvent,
    OutboundMessage, PluginAdapter, SkippedReply,
};

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL_EVERY: Duration = Duration::from_millis(5);

#[derive(Clone)]
pub struct MockChannel {
    name: String,
    inbound: Arc<Mutex<VecDeque<InboundEvent>>>,
    delivered: Arc<Mutex<Vec<OutboundMessage>>>,
    skipped: Arc<Mutex<Vec<SkippedReply>>>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            delivered: Arc::new(Mutex::new(Vec::new())),
            skipped: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue an event for the next `receive()`.
    pub async fn inject(&self, event: InboundEvent) {
        self.inbound.lock().await.push_back(event);
        self.notify.notify_one();
    }

    /// Make `receive()` fail with a closed error once the queue drains.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub async fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().await.clone()
    }

    pub async fn delivered_count(&self) -> usize {
        self.delivered.lock().await.len()
    }

    pub async fn clear_delivered(&self) {
        self.delivered.lock().await.clear();
    }

    pub async fn skipped(&self) -> Vec<SkippedReply> {
        self.skipped.lock().await.clone()
    }

    /// Wait until at least `count` messages were delivered, then return them.
    /// Gives up after a few seconds and returns whatever arrived.
    pub async fn wait_for_delivery(&self, count: usize) -> Vec<OutboundMessage> {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            let delivered = self.delivered().await;
            if delivered.len() >= count || tokio::time::Instant::now() >= deadline {
                return delivered;
            }
            tokio::time::sleep(POLL_EVERY).await;
        }
    }

    /// Wait until at least `count` skip notifications arrived.
    pub async fn wait_for_skip(&self, count: usize) -> Vec<SkippedReply> {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            let skipped = self.skipped().await;
            if skipped.len() >= count || tokio::time::Instant::now() >= deadline {
                return skipped;
            }
            tokio::time::sleep(POLL_EVERY).await;
        }
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, HighclawError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), HighclawError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn describe(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            name: self.name.clone(),
            supports_groups: true,
            max_message_length: None,
        }
    }

    async fn connect(&mut self) -> Result<(), HighclawError> {
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, HighclawError> {
        loop {
            if let Some(event) = self.inbound.lock().await.pop_front() {
                return Ok(event);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(HighclawError::Channel {
                    message: "mock channel closed".to_string(),
                    source: None,
                });
            }
            self.notify.notified().await;
        }
    }

    async fn deliver(&self, msg: OutboundMessage) -> Result<(), HighclawError> {
        self.delivered.lock().await.push(msg);
        Ok(())
    }

    async fn skip(&self, _event: &InboundEvent, reason: SkippedReply) -> Result<(), HighclawError> {
        self.skipped.lock().await.push(reason);
        Ok(())
    }
}

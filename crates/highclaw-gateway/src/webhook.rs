// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/reply pairing for the webhook channel.
//!
//! `POST /api/inbound` pushes an [`InboundEvent`] into the agent loop and
//! parks a oneshot sender under a fresh correlation id. The gateway channel
//! completes it from `deliver` (a reply) or `skip` (no reply).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use highclaw_core::{HighclawError, InboundEvent, SkippedReply};
use tokio::sync::{mpsc, oneshot};

/// How long an inbound event may wait for room in the agent loop's queue.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the agent loop made of a webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    Replied { session_key: String, reply: String },
    Skipped(SkippedReply),
}

/// Cloneable sender half of the webhook channel.
#[derive(Clone)]
pub struct Webhook {
    inbound_tx: mpsc::Sender<InboundEvent>,
    pending: Arc<DashMap<String, oneshot::Sender<WebhookReply>>>,
    reply_timeout: Duration,
}

impl Webhook {
    pub(crate) fn new(
        inbound_tx: mpsc::Sender<InboundEvent>,
        pending: Arc<DashMap<String, oneshot::Sender<WebhookReply>>>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            inbound_tx,
            pending,
            reply_timeout,
        }
    }

    /// Queue `event` for the agent loop and wait for its outcome.
    ///
    /// Any `correlation_id` on the event is replaced.
    pub async fn submit(&self, mut event: InboundEvent) -> Result<WebhookReply, HighclawError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        event.correlation_id = Some(correlation_id.clone());

        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        match tokio::time::timeout(ENQUEUE_TIMEOUT, self.inbound_tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.pending.remove(&correlation_id);
                return Err(HighclawError::Channel {
                    message: "agent loop not accepting messages".to_string(),
                    source: None,
                });
            }
            Err(_) => {
                self.pending.remove(&correlation_id);
                return Err(HighclawError::Channel {
                    message: "inbound queue full".to_string(),
                    source: None,
                });
            }
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(HighclawError::Internal(
                "reply channel closed before the agent answered".to_string(),
            )),
            Err(_) => {
                self.pending.remove(&correlation_id);
                Err(HighclawError::Timeout {
                    duration: self.reply_timeout,
                })
            }
        }
    }

    /// Complete the waiter for `correlation_id`. Returns false when nobody
    /// is waiting, e.g. after a timeout.
    pub(crate) fn complete(&self, correlation_id: &str, reply: WebhookReply) -> bool {
        match self.pending.remove(correlation_id) {
            Some((_, waiter)) => waiter.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use highclaw_core::PeerContext;

    fn event() -> InboundEvent {
        InboundEvent {
            id: "evt-1".into(),
            peer: PeerContext::direct("telegram", "u1"),
            sender: None,
            text: "hi".into(),
            mentioned: false,
            session_key: None,
            correlation_id: Some("caller-chosen".into()),
        }
    }

    fn webhook(timeout: Duration) -> (Webhook, mpsc::Receiver<InboundEvent>) {
        let (tx, rx) = mpsc::channel(4);
        (Webhook::new(tx, Arc::new(DashMap::new()), timeout), rx)
    }

    #[tokio::test]
    async fn submit_waits_for_completion() {
        let (hook, mut rx) = webhook(Duration::from_secs(5));
        let responder = {
            let hook = hook.clone();
            tokio::spawn(async move {
                let event = rx.recv().await.unwrap();
                let id = event.correlation_id.unwrap();
                assert_ne!(id, "caller-chosen");
                hook.complete(
                    &id,
                    WebhookReply::Replied {
                        session_key: "agent:main:main".into(),
                        reply: "hello".into(),
                    },
                )
            })
        };

        let reply = hook.submit(event()).await.unwrap();
        assert!(responder.await.unwrap());
        assert_eq!(
            reply,
            WebhookReply::Replied {
                session_key: "agent:main:main".into(),
                reply: "hello".into(),
            }
        );
        assert_eq!(hook.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_submit_times_out_and_cleans_up() {
        let (hook, _rx) = webhook(Duration::from_secs(2));
        let err = hook.submit(event()).await.unwrap_err();
        assert!(matches!(err, HighclawError::Timeout { .. }));
        assert_eq!(hook.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_agent_loop_is_a_channel_error() {
        let (hook, rx) = webhook(Duration::from_secs(2));
        drop(rx);
        let err = hook.submit(event()).await.unwrap_err();
        assert!(err.to_string().contains("not accepting"));
        assert_eq!(hook.pending_count(), 0);
    }

    #[test]
    fn complete_without_waiter_is_false() {
        let (hook, _rx) = webhook(Duration::from_secs(1));
        assert!(!hook.complete("nobody", WebhookReply::Skipped(SkippedReply::Duplicate)));
    }
}

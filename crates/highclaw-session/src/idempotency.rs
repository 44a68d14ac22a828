// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-most-once gate for chat writes keyed by a caller-supplied token.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(300);

/// Result of claiming an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First sighting within the TTL; the caller should proceed.
    Fresh,
    /// Seen within the TTL; the caller must short-circuit.
    Duplicate,
}

/// Remembers first-seen times of idempotency keys for one TTL.
#[derive(Debug)]
pub struct IdempotencyGate {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Default for IdempotencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_IDEMPOTENCY_TTL)
    }
}

impl IdempotencyGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Claim `key`. Blank keys are never recorded and always fresh.
    pub async fn claim(&self, key: &str) -> ClaimOutcome {
        let key = key.trim();
        if key.is_empty() {
            return ClaimOutcome::Fresh;
        }

        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        if let Some(first_seen) = seen.get(key)
            && now.duration_since(*first_seen) < self.ttl
        {
            return ClaimOutcome::Duplicate;
        }

        seen.retain(|_, first_seen| now.duration_since(*first_seen) < self.ttl);
        seen.insert(key.to_string(), now);
        ClaimOutcome::Fresh
    }

    /// Number of keys currently remembered (expired entries linger until the next claim).
    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn duplicate_within_ttl_fresh_after() {
        let gate = IdempotencyGate::default();
        assert_eq!(gate.claim("req-1").await, ClaimOutcome::Fresh);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(gate.claim("req-1").await, ClaimOutcome::Duplicate);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(gate.claim("req-1").await, ClaimOutcome::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept_on_insert() {
        let gate = IdempotencyGate::new(Duration::from_secs(10));
        gate.claim("a").await;
        gate.claim("b").await;
        tokio::time::advance(Duration::from_secs(11)).await;

        gate.claim("c").await;
        assert_eq!(gate.len().await, 1);
    }

    #[tokio::test]
    async fn blank_keys_are_not_tracked() {
        let gate = IdempotencyGate::default();
        assert_eq!(gate.claim("  ").await, ClaimOutcome::Fresh);
        assert_eq!(gate.claim("").await, ClaimOutcome::Fresh);
        assert!(gate.is_empty().await);
    }

    #[tokio::test]
    async fn keys_are_trimmed() {
        let gate = IdempotencyGate::default();
        assert_eq!(gate.claim("k").await, ClaimOutcome::Fresh);
        assert_eq!(gate.claim(" k ").await, ClaimOutcome::Duplicate);
    }
}

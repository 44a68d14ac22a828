// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The live key -> session mapping.
//!
//! The registry lock guards the map. Lock order is registry, then session,
//! then file I/O: disk loads and removals run while the map is write-locked so
//! a reload can never race a delete.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::{Session, SessionSummary};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live session for `key`, creating an empty one if absent.
    /// The first caller wins; `channel` is only used at creation.
    pub async fn get_or_create(&self, key: &str, channel: &str) -> Arc<Session> {
        self.get_or_insert_with(key, || Session::new(key, channel))
            .await
            .0
    }

    /// Insert `make()` under `key` unless a session is already live.
    ///
    /// Returns the stored session and whether this call created it.
    pub async fn get_or_insert_with(
        &self,
        key: &str,
        make: impl FnOnce() -> Session,
    ) -> (Arc<Session>, bool) {
        if let Some(existing) = self.sessions.read().await.get(key) {
            return (existing.clone(), false);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(key) {
            return (existing.clone(), false);
        }
        let session = Arc::new(make());
        sessions.insert(key.to_string(), session.clone());
        (session, true)
    }

    /// Return the live session for `key`, or install the one `load` yields.
    ///
    /// `load` runs with the map write-locked. Returns the session and whether
    /// this call installed it.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: &str,
        load: F,
    ) -> Result<(Arc<Session>, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session, E>>,
    {
        if let Some(existing) = self.sessions.read().await.get(key) {
            return Ok((existing.clone(), false));
        }

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(key) {
            return Ok((existing.clone(), false));
        }
        let session = Arc::new(load().await?);
        sessions.insert(key.to_string(), session.clone());
        Ok((session, true))
    }

    /// Unregister `key` and hand the removed session (if it was live) to
    /// `finish` before the map lock is released.
    pub async fn remove_with<F, Fut, T>(&self, key: &str, finish: F) -> T
    where
        F: FnOnce(Option<Arc<Session>>) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(key);
        finish(removed).await
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Remove `key`; a missing key is a no-op.
    pub async fn delete(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(key)
    }

    /// Summaries of every live session, most recently active first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            summaries.push(session.summary().await);
        }
        summaries.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        summaries
    }

    /// Handles to every live session, without holding the map lock afterwards.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

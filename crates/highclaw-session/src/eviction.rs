// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stale-session pruning and last-active recovery over on-disk snapshots.

use chrono::{DateTime, TimeDelta, Utc};
use highclaw_core::HighclawError;
use serde::Serialize;
use tracing::debug;

use crate::registry::SessionRegistry;
use crate::store::SessionStore;

/// Counts of sessions removed by one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Removed for exceeding the age bound.
    pub pruned: usize,
    /// Removed for exceeding the count bound.
    pub capped: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.pruned + self.capped
    }
}

/// Remove sessions idle longer than `max_age_days`, then keep at most
/// `max_count` of the rest. Zero disables either bound. Removal covers the
/// snapshot and any live registry entry.
pub async fn prune_stale(
    store: &SessionStore,
    registry: &SessionRegistry,
    max_age_days: u32,
    max_count: usize,
) -> Result<PruneReport, HighclawError> {
    prune_stale_at(store, registry, max_age_days, max_count, Utc::now()).await
}

pub(crate) async fn prune_stale_at(
    store: &SessionStore,
    registry: &SessionRegistry,
    max_age_days: u32,
    max_count: usize,
    now: DateTime<Utc>,
) -> Result<PruneReport, HighclawError> {
    let mut snapshots = store.load_all().await?;
    snapshots.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut report = PruneReport::default();

    if max_age_days > 0 {
        let cutoff = now - TimeDelta::days(i64::from(max_age_days));
        let (kept, stale): (Vec<_>, Vec<_>) = snapshots
            .into_iter()
            .partition(|s| s.last_activity_at >= cutoff);
        for snapshot in &stale {
            remove(store, registry, &snapshot.key).await?;
            report.pruned += 1;
        }
        snapshots = kept;
    }

    if max_count > 0 && snapshots.len() > max_count {
        for snapshot in snapshots.split_off(max_count) {
            remove(store, registry, &snapshot.key).await?;
            report.capped += 1;
        }
    }

    if report.total() > 0 {
        debug!(
            pruned = report.pruned,
            capped = report.capped,
            remaining = snapshots.len(),
            "pruned stale sessions"
        );
    }
    Ok(report)
}

/// Unregister `key` and unlink its snapshot. A live session is marked
/// removed under its own lock first, and the registry stays write-locked
/// until the file is gone, so neither a writer nor a reload can restore it.
pub(crate) async fn remove(
    store: &SessionStore,
    registry: &SessionRegistry,
    key: &str,
) -> Result<(), HighclawError> {
    registry
        .remove_with(key, move |live| async move {
            match live {
                Some(session) => store.delete_session(&session).await,
                None => store.delete(key).await,
            }
        })
        .await?;
    debug!(session_key = %key, "session removed");
    Ok(())
}

/// The key of the most recently active snapshot on disk, if any.
pub async fn last_session_key(store: &SessionStore) -> Result<Option<String>, HighclawError> {
    Ok(store
        .load_all()
        .await?
        .into_iter()
        .max_by(|a, b| {
            a.last_activity_at
                .cmp(&b.last_activity_at)
                .then_with(|| b.key.cmp(&a.key))
        })
        .map(|s| s.key))
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background upkeep for the session store.
//!
//! Two independent timers run until cancelled: an auto-save sweep over live
//! sessions and a stale-session prune. Either is disabled by a zero interval.
//! Failures are logged and never stop the timer.

use std::sync::Arc;
use std::time::Duration;

use highclaw_config::model::SessionConfig;
use highclaw_session::SessionManager;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Intervals and bounds for the maintenance timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceConfig {
    pub auto_save_interval: Duration,
    pub prune_interval: Duration,
    pub prune_max_age_days: u32,
    pub prune_max_count: usize,
}

impl From<&SessionConfig> for MaintenanceConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            auto_save_interval: Duration::from_secs(config.auto_save_interval_secs),
            prune_interval: Duration::from_secs(config.prune_interval_secs),
            prune_max_age_days: config.prune_max_age_days,
            prune_max_count: config.prune_max_count,
        }
    }
}

/// Spawn the enabled maintenance timers. The returned handles finish once
/// `cancel` fires.
pub fn spawn_maintenance(
    sessions: Arc<SessionManager>,
    config: MaintenanceConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if config.auto_save_interval.is_zero() {
        debug!("auto-save disabled");
    } else {
        let sessions = sessions.clone();
        handles.push(tokio::spawn(run_every(
            config.auto_save_interval,
            cancel.clone(),
            "auto-save",
            move || {
                let sessions = sessions.clone();
                async move { auto_save_tick(&sessions).await }
            },
        )));
    }

    if config.prune_interval.is_zero() {
        debug!("stale-session pruning disabled");
    } else {
        let max_age_days = config.prune_max_age_days;
        let max_count = config.prune_max_count;
        handles.push(tokio::spawn(run_every(
            config.prune_interval,
            cancel,
            "prune",
            move || {
                let sessions = sessions.clone();
                async move { prune_tick(&sessions, max_age_days, max_count).await }
            },
        )));
    }

    handles
}

async fn run_every<F, Fut>(period: Duration, cancel: CancellationToken, name: &str, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            _ = cancel.cancelled() => {
                debug!(task = name, "maintenance task shutting down");
                break;
            }
        }
    }
}

pub async fn auto_save_tick(sessions: &SessionManager) {
    let report = sessions.save_all().await;
    if report.failed > 0 {
        warn!(
            saved = report.saved,
            failed = report.failed,
            "auto-save finished with failures"
        );
    } else {
        debug!(saved = report.saved, "auto-save finished");
    }
}

pub async fn prune_tick(sessions: &SessionManager, max_age_days: u32, max_count: usize) {
    match sessions.prune_stale(max_age_days, max_count).await {
        Ok(report) if report.total() > 0 => {
            info!(
                pruned = report.pruned,
                capped = report.capped,
                "stale sessions pruned"
            );
        }
        Ok(_) => debug!("no stale sessions to prune"),
        Err(e) => warn!(error = %e, "session prune failed (non-fatal)"),
    }
}

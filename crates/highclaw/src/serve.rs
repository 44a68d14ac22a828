// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `highclaw serve` command implementation.
//!
//! Hydrates the session store, wires the Anthropic runner into the chat
//! pipeline, starts maintenance timers and the gateway, and runs the agent
//! loop until a shutdown signal arrives.

use std::sync::Arc;

use highclaw_agent::shutdown::{flush_sessions, install_signal_handler};
use highclaw_agent::{
    AgentLoop, ChatConfig, ChatService, MaintenanceConfig, build_session_manager,
    spawn_maintenance,
};
use highclaw_anthropic::AnthropicRunner;
use highclaw_config::HighclawConfig;
use highclaw_core::{ChannelAdapter, HighclawError};
use highclaw_gateway::{GatewayChannel, GatewayChannelConfig};
use tracing::{info, warn};

/// Runs the `highclaw serve` command.
pub async fn run_serve(config: HighclawConfig) -> Result<(), HighclawError> {
    init_tracing(&config.agent.log_level);

    info!(
        agent = %config.agent.name,
        root = %config.storage.root_path().display(),
        "starting highclaw"
    );

    let chat = build_chat_service(&config).await?;
    let sessions = Arc::clone(chat.sessions());

    let cancel = install_signal_handler();
    let maintenance = spawn_maintenance(
        Arc::clone(&sessions),
        MaintenanceConfig::from(&config.session),
        cancel.clone(),
    );

    let result = if config.gateway.enabled {
        let mut gateway = GatewayChannel::new(
            GatewayChannelConfig::from_config(&config),
            Arc::clone(&chat),
            &cancel,
        );
        gateway.connect().await?;

        // The gateway keeps its own loop: webhook callers label their events
        // with the bridge's channel, which a multiplexer would overwrite.
        let mut agent_loop = AgentLoop::new(Box::new(gateway), Arc::clone(&chat));
        agent_loop.run(cancel.clone()).await
    } else {
        info!("gateway disabled, waiting for shutdown signal");
        cancel.cancelled().await;
        Ok(())
    };

    // A failed loop still tears down the timers before the final flush.
    cancel.cancel();
    for handle in maintenance {
        if let Err(e) = handle.await {
            warn!(error = %e, "maintenance task did not stop cleanly");
        }
    }
    flush_sessions(&sessions).await;

    result?;
    info!("highclaw serve shutdown complete");
    Ok(())
}

/// Hydrates the store and assembles the chat pipeline shared by every
/// surface.
pub async fn build_chat_service(config: &HighclawConfig) -> Result<Arc<ChatService>, HighclawError> {
    let sessions = Arc::new(build_session_manager(config));
    let restored = sessions.hydrate().await?;
    info!(sessions = restored, "session store hydrated");

    let runner = Arc::new(AnthropicRunner::new(config)?);
    Ok(Arc::new(ChatService::new(
        sessions,
        runner,
        ChatConfig::from_config(config),
    )))
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("highclaw={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

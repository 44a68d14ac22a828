// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use highclaw_agent::ChatService;
use highclaw_core::HighclawError;
use highclaw_session::SessionManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::auth::{AuthConfig, auth_middleware, ws_auth_middleware};
use crate::handlers;
use crate::webhook::Webhook;
use crate::ws;

/// Defaults applied when a prune request leaves a bound unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneLimits {
    pub max_age_days: u32,
    pub max_count: usize,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Chat pipeline; also the route to the session manager.
    pub chat: Arc<ChatService>,
    /// Hand-off to the agent loop for `/api/inbound`.
    pub webhook: Webhook,
    pub auth: AuthConfig,
    pub prune: PruneLimits,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

impl GatewayState {
    pub fn sessions(&self) -> &SessionManager {
        self.chat.sessions()
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind. 0 picks a free port.
    pub port: u16,
}

/// Assemble the gateway routes:
/// - `GET /health` (open)
/// - `/api/*` REST endpoints (bearer auth)
/// - `GET /ws` JSON-RPC over WebSocket (bearer header or `?token=`)
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/api/sessions/prune", post(handlers::prune_sessions))
        .route(
            "/api/sessions/{key}",
            get(handlers::get_session)
                .post(handlers::append_message)
                .patch(handlers::patch_session)
                .delete(handlers::delete_session),
        )
        .route("/api/sessions/{key}/reset", post(handlers::reset_session))
        .route("/api/chat", post(handlers::post_chat))
        .route(
            "/api/bindings",
            get(handlers::list_bindings)
                .post(handlers::set_binding)
                .delete(handlers::remove_binding),
        )
        .route(
            "/api/current",
            get(handlers::get_current).put(handlers::set_current),
        )
        .route("/api/inbound", post(handlers::post_inbound))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            ws_auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

/// Bind the gateway listener.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, HighclawError> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| HighclawError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Serve the gateway on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), HighclawError> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "gateway server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| HighclawError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway server stopped");
    Ok(())
}

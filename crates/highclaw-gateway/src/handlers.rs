// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! The session operations here are shared with the JSON-RPC dispatcher, so
//! both surfaces return the same shapes and the same error kinds.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use highclaw_agent::{ChatOutcome, ChatRequest};
use highclaw_core::{ErrorKind, HighclawError, InboundEvent, PeerContext, SkippedReply};
use highclaw_session::{NewMessage, PruneReport, SessionBinding, SessionPatch, SessionSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::server::GatewayState;
use crate::webhook::WebhookReply;

/// Channel label recorded on turns that arrive over REST.
pub const API_CHANNEL: &str = "api";

/// Header that opts a chat request into duplicate suppression.
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

// --- Errors ---

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::PolicyViolation => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Runner => StatusCode::BAD_GATEWAY,
        ErrorKind::IoError | ErrorKind::Config | ErrorKind::Channel | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable kebab-case error kind.
    pub kind: String,
}

/// A [`HighclawError`] rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub HighclawError);

impl From<HighclawError> for ApiError {
    fn from(err: HighclawError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(self.0.kind(), self.0.to_string())
    }
}

fn error_response(kind: ErrorKind, error: String) -> Response {
    let status = status_for(kind);
    if status.is_server_error() {
        tracing::warn!(kind = %kind, error = %error, "gateway request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error,
            kind: kind.to_string(),
        }),
    )
        .into_response()
}

type ApiResult<T> = Result<T, ApiError>;

// --- Request bodies ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSessionBody {
    pub key: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub session_key: Option<String>,
    pub message: String,
    /// Route by peer when no session key is given.
    #[serde(default)]
    pub peer: Option<PeerContext>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub mentioned: bool,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingBody {
    pub channel: String,
    pub conversation: String,
    pub session_key: String,
}

#[derive(Debug, Deserialize)]
pub struct BindingQuery {
    pub channel: String,
    pub conversation: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyBody {
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PruneBody {
    pub max_age_days: Option<u32>,
    pub max_count: Option<usize>,
}

/// Body of `POST /api/inbound`, posted by external channel bridges.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundBody {
    /// Bridge-side event id; redeliveries with the same id are dropped.
    #[serde(default)]
    pub id: Option<String>,
    pub peer: PeerContext,
    #[serde(default)]
    pub sender: Option<String>,
    pub text: String,
    #[serde(default)]
    pub mentioned: bool,
    #[serde(default)]
    pub session_key: Option<String>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
}

// --- Operations shared with RPC ---

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) async fn create(
    state: &GatewayState,
    body: CreateSessionBody,
    default_channel: &str,
) -> Result<SessionSummary, HighclawError> {
    let sessions = state.sessions();
    let key = non_blank(body.key).unwrap_or_else(|| {
        format!(
            "agent:{}:{}",
            sessions.policy().agent_id,
            uuid::Uuid::new_v4().simple()
        )
    });
    let channel = non_blank(body.channel).unwrap_or_else(|| default_channel.to_string());
    let session = sessions.get_or_create(&key, &channel).await?;
    Ok(session.summary().await)
}

pub(crate) async fn detail(state: &GatewayState, key: &str) -> Result<Value, HighclawError> {
    let session = state.sessions().get(key).await?;
    Ok(json!({
        "session": session.summary().await,
        "messages": session.messages().await,
    }))
}

pub(crate) async fn prune(
    state: &GatewayState,
    body: PruneBody,
) -> Result<PruneReport, HighclawError> {
    state
        .sessions()
        .prune_stale(
            body.max_age_days.unwrap_or(state.prune.max_age_days),
            body.max_count.unwrap_or(state.prune.max_count),
        )
        .await
}

pub(crate) async fn bind(
    state: &GatewayState,
    body: BindingBody,
) -> Result<SessionBinding, HighclawError> {
    state
        .sessions()
        .bind(&body.channel, &body.conversation, &body.session_key)
        .await?;
    Ok(SessionBinding {
        channel: body.channel,
        conversation: body.conversation,
        session_key: body.session_key,
    })
}

pub(crate) async fn current_key(state: &GatewayState) -> Result<String, HighclawError> {
    Ok(state
        .sessions()
        .current()
        .await?
        .map(|c| c.key)
        .unwrap_or_default())
}

pub(crate) fn chat_request(body: ChatBody, channel: &str) -> ChatRequest {
    let mut request = match non_blank(body.session_key) {
        Some(key) => ChatRequest::to_session(key, channel, body.message),
        None => ChatRequest::from_peer(
            body.peer.unwrap_or_else(|| PeerContext::direct(channel, "")),
            body.message,
        ),
    };
    request.sender = body.sender;
    request.mentioned = body.mentioned;
    request.idempotency_key = non_blank(body.idempotency_key);
    request
}

pub(crate) fn outcome_json(outcome: &ChatOutcome) -> Value {
    match outcome {
        ChatOutcome::Duplicate => json!({ "duplicate": true }),
        ChatOutcome::Recorded { session_key } => {
            json!({ "sessionKey": session_key, "recorded": true })
        }
        ChatOutcome::Replied {
            session_key,
            reply,
            tokens_in,
            tokens_out,
        } => json!({
            "sessionKey": session_key,
            "reply": reply,
            "tokensIn": tokens_in,
            "tokensOut": tokens_out,
        }),
    }
}

// --- Handlers ---

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sessions: state.sessions().count().await,
    })
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "sessions": state.sessions().list().await }))
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<GatewayState>,
    Json(body): Json<CreateSessionBody>,
) -> ApiResult<(StatusCode, Json<SessionSummary>)> {
    let summary = create(&state, body, API_CHANNEL).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/sessions/{key}
pub async fn get_session(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(detail(&state, &key).await?))
}

/// POST /api/sessions/{key}: append one message to an existing session.
pub async fn append_message(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
    Json(mut msg): Json<NewMessage>,
) -> ApiResult<Response> {
    if msg.channel.is_none() {
        msg.channel = Some(API_CHANNEL.to_string());
    }
    let stored = state.sessions().add_message(&key, msg).await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

/// PATCH /api/sessions/{key}
pub async fn patch_session(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> ApiResult<Json<SessionSummary>> {
    Ok(Json(state.sessions().patch(&key, &patch).await?))
}

/// DELETE /api/sessions/{key}
pub async fn delete_session(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions().delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/{key}/reset
pub async fn reset_session(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions().reset(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/prune. The body is optional.
pub async fn prune_sessions(
    State(state): State<GatewayState>,
    body: Bytes,
) -> ApiResult<Json<PruneReport>> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        PruneBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| HighclawError::InvalidInput(format!("invalid prune body: {e}")))?
    };
    Ok(Json(prune(&state, body).await?))
}

/// POST /api/chat
///
/// Runs one chat turn. `X-Idempotency-Key` takes precedence over an
/// `idempotencyKey` in the body.
pub async fn post_chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> ApiResult<Response> {
    let mut request = chat_request(body, API_CHANNEL);
    if let Some(key) = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        request.idempotency_key = Some(key.to_string());
    }

    let outcome = state.chat.send(request).await?;
    let status = match outcome {
        ChatOutcome::Recorded { .. } => StatusCode::ACCEPTED,
        ChatOutcome::Duplicate | ChatOutcome::Replied { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome_json(&outcome))).into_response())
}

/// GET /api/bindings
pub async fn list_bindings(State(state): State<GatewayState>) -> ApiResult<Json<Value>> {
    let bindings = state.sessions().list_bindings().await?;
    Ok(Json(json!({ "bindings": bindings })))
}

/// POST /api/bindings
pub async fn set_binding(
    State(state): State<GatewayState>,
    Json(body): Json<BindingBody>,
) -> ApiResult<Json<SessionBinding>> {
    Ok(Json(bind(&state, body).await?))
}

/// DELETE /api/bindings?channel=..&conversation=..
pub async fn remove_binding(
    State(state): State<GatewayState>,
    Query(query): Query<BindingQuery>,
) -> ApiResult<Json<Value>> {
    let removed = state
        .sessions()
        .unbind(&query.channel, &query.conversation)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

/// GET /api/current
pub async fn get_current(State(state): State<GatewayState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!({ "key": current_key(&state).await? })))
}

/// PUT /api/current
pub async fn set_current(
    State(state): State<GatewayState>,
    Json(body): Json<KeyBody>,
) -> ApiResult<Json<Value>> {
    state.sessions().set_current(&body.key).await?;
    Ok(Json(json!({ "key": body.key })))
}

/// POST /api/inbound
///
/// Webhook channel entry point. The event goes through the agent loop like
/// any channel traffic and the caller is held until the loop answers.
pub async fn post_inbound(
    State(state): State<GatewayState>,
    Json(body): Json<InboundBody>,
) -> ApiResult<Response> {
    if body.peer.channel.trim().is_empty() {
        return Err(HighclawError::InvalidInput("peer.channel is required".to_string()).into());
    }

    let event = InboundEvent {
        id: body.id.unwrap_or_default(),
        peer: body.peer,
        sender: body.sender,
        text: body.text,
        mentioned: body.mentioned,
        session_key: body.session_key,
        correlation_id: None,
    };

    let response = match state.webhook.submit(event).await? {
        WebhookReply::Replied { session_key, reply } => (
            StatusCode::OK,
            Json(json!({ "sessionKey": session_key, "reply": reply })),
        )
            .into_response(),
        WebhookReply::Skipped(SkippedReply::Recorded { session_key }) => (
            StatusCode::ACCEPTED,
            Json(json!({ "sessionKey": session_key, "recorded": true })),
        )
            .into_response(),
        WebhookReply::Skipped(SkippedReply::Duplicate) => {
            (StatusCode::OK, Json(json!({ "duplicate": true }))).into_response()
        }
        WebhookReply::Skipped(SkippedReply::Failed { kind, message }) => {
            error_response(kind, message)
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_error_kind() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::PolicyViolation), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::Runner), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(ErrorKind::IoError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn chat_body_prefers_session_key() {
        let body: ChatBody = serde_json::from_str(
            r#"{"sessionKey": "agent:main:work", "message": "hi", "idempotencyKey": " k1 "}"#,
        )
        .unwrap();
        let request = chat_request(body, API_CHANNEL);
        assert_eq!(request.session_key.as_deref(), Some("agent:main:work"));
        assert_eq!(request.peer.channel, "api");
        assert_eq!(request.idempotency_key.as_deref(), Some("k1"));
    }

    #[test]
    fn chat_body_routes_by_peer_without_key() {
        let body: ChatBody = serde_json::from_str(
            r#"{"sessionKey": "  ", "message": "hi", "peer": {"channel": "slack", "peerId": "u1"}}"#,
        )
        .unwrap();
        let request = chat_request(body, API_CHANNEL);
        assert!(request.session_key.is_none());
        assert_eq!(request.peer.channel, "slack");
        assert!(request.idempotency_key.is_none());
    }

    #[test]
    fn outcome_json_shapes() {
        assert_eq!(
            outcome_json(&ChatOutcome::Duplicate),
            json!({ "duplicate": true })
        );
        assert_eq!(
            outcome_json(&ChatOutcome::Replied {
                session_key: "k".into(),
                reply: "r".into(),
                tokens_in: 1,
                tokens_out: 2,
            }),
            json!({ "sessionKey": "k", "reply": "r", "tokensIn": 1, "tokensOut": 2 })
        );
    }

    #[test]
    fn error_response_serializes() {
        let resp = ErrorResponse {
            error: "session not found: x".to_string(),
            kind: ErrorKind::NotFound.to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"kind\":\"not-found\""));
    }

    #[test]
    fn inbound_body_requires_peer_and_text() {
        assert!(serde_json::from_str::<InboundBody>(r#"{"text": "hi"}"#).is_err());
        let body: InboundBody = serde_json::from_str(
            r#"{"id": "e1", "peer": {"channel": "telegram", "peerId": "42"}, "text": "hi"}"#,
        )
        .unwrap();
        assert_eq!(body.peer.peer_id, "42");
        assert!(!body.mentioned);
    }
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-RPC 2.0 dispatch for WebSocket clients.
//!
//! Client -> Server:
//! ```json
//! {"jsonrpc": "2.0", "id": 1, "method": "chat.send", "params": {"sessionKey": "agent:main:main", "message": "hi"}}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"jsonrpc": "2.0", "id": 1, "result": {"sessionKey": "agent:main:main", "reply": "...", "tokensIn": 12, "tokensOut": 40}}
//! ```

use highclaw_core::{ErrorKind, HighclawError};
use highclaw_session::SessionPatch;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::handlers::{
    self, BindingBody, BindingQuery, ChatBody, CreateSessionBody, KeyBody, PruneBody,
};
use crate::server::GatewayState;

/// Channel label recorded on turns that arrive over RPC.
pub const RPC_CHANNEL: &str = "rpc";

/// Standard and application error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const NOT_FOUND: i64 = -32001;
    pub const POLICY_VIOLATION: i64 = -32002;
    pub const TIMEOUT: i64 = -32003;
    pub const RUNNER_ERROR: i64 = -32004;
}

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications, which get no response.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<HighclawError> for RpcError {
    fn from(err: HighclawError) -> Self {
        let kind = err.kind();
        let code = match kind {
            ErrorKind::NotFound => codes::NOT_FOUND,
            ErrorKind::InvalidInput => codes::INVALID_PARAMS,
            ErrorKind::PolicyViolation => codes::POLICY_VIOLATION,
            ErrorKind::Timeout => codes::TIMEOUT,
            ErrorKind::Runner => codes::RUNNER_ERROR,
            ErrorKind::IoError | ErrorKind::Config | ErrorKind::Channel | ErrorKind::Internal => {
                codes::INTERNAL_ERROR
            }
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(json!({ "kind": kind.to_string() })),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchParams {
    key: String,
    #[serde(flatten)]
    patch: SessionPatch,
}

/// Parse one text frame and dispatch it. Returns `None` for notifications.
pub async fn handle_frame(state: &GatewayState, frame: &str) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(frame) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable RPC frame");
            return Some(RpcResponse::failure(
                Value::Null,
                RpcError::new(codes::PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };

    let notification = request.id.is_none();
    let response = dispatch(state, request).await;
    (!notification).then_some(response)
}

/// Run one request against the session manager or chat pipeline.
pub async fn dispatch(state: &GatewayState, request: RpcRequest) -> RpcResponse {
    let id = request.id.unwrap_or(Value::Null);
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return RpcResponse::failure(
            id,
            RpcError::new(codes::INVALID_REQUEST, "unsupported jsonrpc version"),
        );
    }

    tracing::debug!(method = %request.method, "rpc call");
    match call(state, &request.method, request.params).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    }
}

async fn call(state: &GatewayState, method: &str, params: Value) -> Result<Value, RpcError> {
    let sessions = state.sessions();
    let result = match method {
        "sessions.list" => json!({ "sessions": sessions.list().await }),
        "sessions.get" => {
            let KeyBody { key } = parse(params)?;
            handlers::detail(state, &key).await?
        }
        "sessions.create" => {
            let body: CreateSessionBody = parse(params)?;
            to_value(handlers::create(state, body, RPC_CHANNEL).await?)?
        }
        "sessions.delete" => {
            let KeyBody { key } = parse(params)?;
            sessions.delete(&key).await?;
            json!({ "ok": true })
        }
        "sessions.reset" => {
            let KeyBody { key } = parse(params)?;
            sessions.reset(&key).await?;
            json!({ "ok": true })
        }
        "sessions.patch" => {
            let PatchParams { key, patch } = parse(params)?;
            to_value(sessions.patch(&key, &patch).await?)?
        }
        "sessions.prune" => {
            let body: PruneBody = parse(params)?;
            to_value(handlers::prune(state, body).await?)?
        }
        "sessions.current" => json!({ "key": handlers::current_key(state).await? }),
        "sessions.setCurrent" => {
            let KeyBody { key } = parse(params)?;
            sessions.set_current(&key).await?;
            json!({ "key": key })
        }
        "bindings.list" => json!({ "bindings": sessions.list_bindings().await? }),
        "bindings.set" => {
            let body: BindingBody = parse(params)?;
            to_value(handlers::bind(state, body).await?)?
        }
        "bindings.remove" => {
            let BindingQuery {
                channel,
                conversation,
            } = parse(params)?;
            json!({ "removed": sessions.unbind(&channel, &conversation).await? })
        }
        "chat.send" => {
            let body: ChatBody = parse(params)?;
            let outcome = state
                .chat
                .send(handlers::chat_request(body, RPC_CHANNEL))
                .await?;
            handlers::outcome_json(&outcome)
        }
        other => {
            return Err(RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ));
        }
    };
    Ok(result)
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| RpcError::new(codes::INVALID_PARAMS, format!("invalid params: {e}")))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(codes::INTERNAL_ERROR, e.to_string()))
}

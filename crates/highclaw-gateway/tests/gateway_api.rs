// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway routes exercised in-process through `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use highclaw_agent::AgentLoop;
use highclaw_gateway::rpc::{self, codes};
use highclaw_gateway::{GatewayChannel, GatewayChannelConfig, build_router};
use highclaw_test_utils::TestHarness;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const TOKEN: &str = "t0k3n";

fn gateway(harness: &TestHarness, token: Option<&str>) -> GatewayChannel {
    let mut config = GatewayChannelConfig::from_config(&harness.config);
    config.bearer_token = token.map(str::to_string);
    GatewayChannel::new(config, harness.chat.clone(), &CancellationToken::new())
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    call_with(app, Request::builder().method(method).uri(uri), body).await
}

async fn call_with(
    app: &Router,
    mut builder: axum::http::request::Builder,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_open_while_api_requires_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(gateway(&harness, Some(TOKEN)).state());

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = call(&app, Method::GET, "/api/sessions", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/sessions")
        .header("authorization", format!("Bearer {TOKEN}"));
    let (status, body) = call_with(&app, request, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"], json!([]));
}

#[tokio::test]
async fn websocket_handshake_checks_query_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(gateway(&harness, Some(TOKEN)).state());

    let (status, _) = call(&app, Method::GET, "/ws", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Past auth; the plain request then fails the upgrade itself.
    let (status, _) = call(&app, Method::GET, &format!("/ws?token={TOKEN}"), None).await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_lifecycle_over_rest() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(gateway(&harness, None).state());
    let uri = "/api/sessions/agent:main:work";

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "key": "agent:main:work" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["key"], "agent:main:work");
    assert_eq!(body["channel"], "api");

    let (status, body) = call(
        &app,
        Method::POST,
        uri,
        Some(json!({ "role": "user", "content": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "user");
    assert_eq!(body["channel"], "api");

    let patch = json!({ "model": "claude-haiku" });
    let (status, body) = call(&app, Method::PATCH, uri, Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "claude-haiku");

    let (status, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["messageCount"], 1);
    assert_eq!(body["messages"][0]["content"], "hello");

    let (status, _) = call(&app, Method::POST, &format!("{uri}/reset"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(body["messages"], json!([]));

    let (status, _) = call(&app, Method::DELETE, uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not-found");
}

#[tokio::test]
async fn unknown_role_is_bad_request() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(gateway(&harness, None).state());
    let create = json!({ "key": "agent:main:x" });
    call(&app, Method::POST, "/api/sessions", Some(create)).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/sessions/agent:main:x",
        Some(json!({ "role": "tool", "content": "ls" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");
}

#[tokio::test]
async fn chat_honours_idempotency_header() {
    let harness = TestHarness::builder()
        .with_replies(vec!["first answer".into()])
        .build()
        .await
        .unwrap();
    let app = build_router(gateway(&harness, None).state());
    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/chat")
            .header("x-idempotency-key", "req-1")
    };
    let body = json!({ "sessionKey": "agent:main:main", "message": "hello" });

    let (status, first) = call_with(&app, request(), Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["reply"], "first answer");
    assert_eq!(first["sessionKey"], "agent:main:main");

    let (status, second) = call_with(&app, request(), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, json!({ "duplicate": true }));

    assert_eq!(harness.runner.call_count().await, 1);
    assert_eq!(
        harness.sessions.messages("agent:main:main").await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn bindings_route_peer_chats() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(gateway(&harness, None).state());

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/bindings",
        Some(json!({ "channel": "slack", "conversation": "C1", "sessionKey": "agent:main:proj" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = call(&app, Method::GET, "/api/bindings", None).await;
    assert_eq!(listed["bindings"][0]["sessionKey"], "agent:main:proj");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({
            "message": "status?",
            "peer": { "channel": "slack", "peerId": "u9", "conversation": "C1" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionKey"], "agent:main:proj");

    let (_, removed) = call(
        &app,
        Method::DELETE,
        "/api/bindings?channel=slack&conversation=C1",
        None,
    )
    .await;
    assert_eq!(removed, json!({ "removed": true }));
}

#[tokio::test]
async fn current_pointer_and_prune() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(gateway(&harness, None).state());

    let pointer = json!({ "key": "agent:main:x" });
    let (status, _) = call(&app, Method::PUT, "/api/current", Some(pointer)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, Method::GET, "/api/current", None).await;
    assert_eq!(body["key"], "agent:main:x");

    let (status, body) = call(&app, Method::POST, "/api/sessions/prune", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "pruned": 0, "capped": 0 }));
}

#[tokio::test]
async fn webhook_round_trips_through_agent_loop() {
    let harness = TestHarness::builder().build().await.unwrap();
    let channel = gateway(&harness, None);
    let app = build_router(channel.state());

    let cancel = CancellationToken::new();
    let mut agent = AgentLoop::new(Box::new(channel), harness.chat.clone());
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { agent.run(cancel).await })
    };

    let dm = json!({
        "id": "e1",
        "peer": { "channel": "telegram", "peerId": "42" },
        "text": "hi"
    });
    let (status, body) = call(&app, Method::POST, "/api/inbound", Some(dm.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionKey"], "agent:main:main");
    assert_eq!(body["reply"], "mock reply");

    let (status, body) = call(&app, Method::POST, "/api/inbound", Some(dm)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "duplicate": true }));

    let group = json!({
        "id": "e2",
        "peer": { "channel": "discord", "peerId": "u1", "peerKind": "group", "groupId": "g1" },
        "text": "chatter"
    });
    let (status, body) = call(&app, Method::POST, "/api/inbound", Some(group)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["sessionKey"], "agent:main:discord:group:g1");
    assert_eq!(body["recorded"], true);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/inbound",
        Some(json!({ "peer": { "channel": "telegram", "peerId": "42" }, "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid-input");

    cancel.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(harness.runner.call_count().await, 1);
}

#[tokio::test]
async fn rpc_frames_dispatch_to_sessions_and_chat() {
    let harness = TestHarness::builder().build().await.unwrap();
    let state = gateway(&harness, None).state();

    let created = rpc::handle_frame(
        &state,
        r#"{"jsonrpc":"2.0","id":1,"method":"sessions.create","params":{"key":"agent:main:ws"}}"#,
    )
    .await
    .unwrap();
    assert_eq!(created.id, json!(1));
    assert_eq!(created.result.unwrap()["channel"], "rpc");

    let sent = rpc::handle_frame(
        &state,
        r#"{"jsonrpc":"2.0","id":2,"method":"chat.send","params":{"sessionKey":"agent:main:ws","message":"hi","idempotencyKey":"m1"}}"#,
    )
    .await
    .unwrap();
    assert_eq!(sent.result.unwrap()["reply"], "mock reply");

    let missing = rpc::handle_frame(
        &state,
        r#"{"jsonrpc":"2.0","id":3,"method":"sessions.get","params":{"key":"agent:main:nope"}}"#,
    )
    .await
    .unwrap();
    assert_eq!(missing.error.unwrap().code, codes::NOT_FOUND);

    let unknown = rpc::handle_frame(&state, r#"{"jsonrpc":"2.0","id":4,"method":"tools.run"}"#)
        .await
        .unwrap();
    assert_eq!(unknown.error.unwrap().code, codes::METHOD_NOT_FOUND);

    let garbage = rpc::handle_frame(&state, "{not json").await.unwrap();
    assert_eq!(garbage.id, Value::Null);
    assert_eq!(garbage.error.unwrap().code, codes::PARSE_ERROR);

    let notification = rpc::handle_frame(
        &state,
        r#"{"jsonrpc":"2.0","method":"sessions.setCurrent","params":{"key":"agent:main:ws"}}"#,
    )
    .await;
    assert!(notification.is_none());
    assert_eq!(
        harness.sessions.current().await.unwrap().map(|c| c.key).as_deref(),
        Some("agent:main:ws")
    );
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end session routing and persistence through `SessionManager`.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use highclaw_core::{DmScope, ErrorKind, PeerContext, Role};
use highclaw_session::{
    ClaimOutcome, DEFAULT_IDEMPOTENCY_TTL, IdentityLinks, KeyPolicy, NewMessage, RouteRequest,
    SessionManager, SessionStore,
};

fn manager_at(root: &std::path::Path, policy: KeyPolicy) -> SessionManager {
    SessionManager::new(
        Arc::new(SessionStore::new(root)),
        policy,
        DEFAULT_IDEMPOTENCY_TTL,
    )
}

#[tokio::test]
async fn routing_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let mut links = IdentityLinks::new();
    links.insert(
        "alice".into(),
        vec!["telegram:alice_tg".into(), "whatsapp:alice_wa".into()],
    );

    let cases = [
        (
            DmScope::PerChannelPeer,
            PeerContext::group("telegram", "user123", "group999"),
            "agent:main:telegram:group:group999",
        ),
        (
            DmScope::Main,
            PeerContext::direct("whatsapp", "123456789"),
            "agent:main:main",
        ),
        (
            DmScope::PerPeer,
            PeerContext::direct("whatsapp", "user456"),
            "agent:main:direct:user456",
        ),
        (
            DmScope::PerPeer,
            PeerContext::direct("whatsapp", "alice_wa"),
            "agent:main:direct:alice",
        ),
        (
            DmScope::PerPeer,
            PeerContext::direct("discord", ""),
            "agent:main:main",
        ),
    ];

    for (scope, peer, expected) in cases {
        let policy = KeyPolicy::default()
            .with_dm_scope(scope)
            .with_identity_links(links.clone());
        let manager = manager_at(dir.path(), policy);
        let key = manager.resolve_session(&RouteRequest::from_peer(peer)).await;
        assert_eq!(key, expected);
    }
}

#[tokio::test]
async fn sessions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let manager = manager_at(dir.path(), KeyPolicy::default());
        manager.get_or_create("agent:main:main", "tui").await.unwrap();
        manager
            .add_message("agent:main:main", NewMessage::user("hi"))
            .await
            .unwrap();
        manager
            .add_message("agent:main:main", NewMessage::assistant("hello"))
            .await
            .unwrap();
    }

    let restarted = manager_at(dir.path(), KeyPolicy::default());
    assert_eq!(restarted.hydrate().await.unwrap(), 1);

    let messages = restarted.messages("agent:main:main").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!((messages[0].role, messages[0].content.as_str()), (Role::User, "hi"));
    assert_eq!(
        (messages[1].role, messages[1].content.as_str()),
        (Role::Assistant, "hello")
    );

    // Appending after reload keeps timestamps non-decreasing.
    let next = restarted
        .add_message("agent:main:main", NewMessage::user("again"))
        .await
        .unwrap();
    assert!(next.timestamp >= messages[1].timestamp);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_is_at_most_one() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager_at(dir.path(), KeyPolicy::default()));

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let m = manager.clone();
            tokio::spawn(async move { m.get_or_create("agent:main:shared", "rpc").await.unwrap() })
        })
        .collect();

    let mut sessions = Vec::new();
    for h in handles {
        sessions.push(h.await.unwrap());
    }
    assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(manager.count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_racing_a_write_stays_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager_at(dir.path(), KeyPolicy::default()));
    let key = "agent:main:racy";

    for round in 0..100 {
        manager.get_or_create(key, "rpc").await.unwrap();

        let writer = {
            let m = manager.clone();
            tokio::spawn(async move {
                m.add_message(key, NewMessage::user(format!("m{round}")))
                    .await
            })
        };
        let deleter = {
            let m = manager.clone();
            tokio::spawn(async move { m.delete(key).await })
        };

        deleter.await.unwrap().unwrap();
        if let Err(e) = writer.await.unwrap() {
            assert_eq!(e.kind(), ErrorKind::NotFound, "round {round}: {e}");
        }

        assert!(
            !manager.store().session_path(key).exists(),
            "round {round}: snapshot came back"
        );
        let err = manager.get(key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

#[tokio::test]
async fn flush_after_delete_does_not_restore_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_at(dir.path(), KeyPolicy::default());
    let session = manager.get_or_create("agent:main:stale", "rpc").await.unwrap();

    manager.delete("agent:main:stale").await.unwrap();
    session.add_message(NewMessage::user("late")).await.unwrap();
    assert_eq!(manager.save_all().await.failed, 0);

    let err = manager.store().save(&session).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let restarted = manager_at(dir.path(), KeyPolicy::default());
    assert_eq!(restarted.hydrate().await.unwrap(), 0);
}

#[tokio::test]
async fn keys_differing_only_in_reserved_characters_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let manager = manager_at(dir.path(), KeyPolicy::default());
        manager.get_or_create("agent:main:main", "tui").await.unwrap();
        manager
            .add_message("agent:main:main", NewMessage::user("important"))
            .await
            .unwrap();
        manager.get_or_create("agent_main_main", "tui").await.unwrap();
    }

    let restarted = manager_at(dir.path(), KeyPolicy::default());
    assert_eq!(restarted.hydrate().await.unwrap(), 2);
    let messages = restarted.messages("agent:main:main").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "important");
    assert!(restarted.messages("agent_main_main").await.unwrap().is_empty());
}

#[tokio::test]
async fn prune_keeps_recent_within_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_at(dir.path(), KeyPolicy::default());
    let now = Utc::now();

    for i in 0..10_i64 {
        let session = manager
            .get_or_create(&format!("agent:main:s{i}"), "rpc")
            .await
            .unwrap();
        let mut snapshot = session.snapshot().await;
        snapshot.last_activity_at = now - TimeDelta::hours(i * 48 + 1);
        manager.store().save_snapshot(&snapshot).await.unwrap();
    }

    let report = manager.prune_stale(7, 3).await.unwrap();
    assert_eq!((report.pruned, report.capped), (6, 1));

    let mut remaining: Vec<_> = manager
        .store()
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["agent:main:s0", "agent:main:s1", "agent:main:s2"]);
    assert_eq!(manager.count().await, 3);
    assert_eq!(
        manager.last_session_key().await.unwrap().as_deref(),
        Some("agent:main:s0")
    );
}

#[tokio::test]
async fn idempotency_claims_are_shared() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_at(dir.path(), KeyPolicy::default());
    assert_eq!(manager.claim_idempotency("abc").await, ClaimOutcome::Fresh);
    assert_eq!(manager.claim_idempotency("abc").await, ClaimOutcome::Duplicate);
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `highclaw sessions` subcommands: offline operations on the session store.
//!
//! These open the store directly, so they should not run against a root a
//! live `highclaw serve` process is writing to.

use clap::Subcommand;
use highclaw_agent::build_session_manager;
use highclaw_config::HighclawConfig;
use highclaw_core::HighclawError;
use highclaw_session::SessionManager;
use serde::Serialize;
use serde_json::json;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionsCommand {
    /// List stored sessions.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print a session and its messages as JSON.
    Show { key: String },
    /// Delete a session.
    Delete { key: String },
    /// Clear a session's messages.
    Reset { key: String },
    /// Remove stale sessions. Bounds default to the configured limits.
    Prune {
        #[arg(long)]
        max_age_days: Option<u32>,
        #[arg(long)]
        max_count: Option<usize>,
    },
    /// Print the current-session pointer.
    Current,
    /// Print the most recently active session.
    Last,
    /// Route a channel conversation to a session.
    Bind {
        channel: String,
        conversation: String,
        key: String,
    },
    /// Remove a conversation binding.
    Unbind {
        channel: String,
        conversation: String,
    },
    /// List conversation bindings.
    Bindings,
}

/// Runs a `highclaw sessions` subcommand and prints its output.
pub async fn run_sessions(
    config: &HighclawConfig,
    command: SessionsCommand,
) -> Result<(), HighclawError> {
    let sessions = build_session_manager(config);
    sessions.hydrate().await?;
    let output = execute(&sessions, config, command).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

async fn execute(
    sessions: &SessionManager,
    config: &HighclawConfig,
    command: SessionsCommand,
) -> Result<String, HighclawError> {
    let output = match command {
        SessionsCommand::List { json: true } => to_json(&sessions.list().await)?,
        SessionsCommand::List { json: false } => {
            let rows: Vec<String> = sessions
                .list()
                .await
                .into_iter()
                .map(|s| {
                    format!(
                        "{:<40} {:<10} {:>5}  {}",
                        s.key,
                        s.channel,
                        s.message_count,
                        s.last_activity_at.format("%Y-%m-%d %H:%M")
                    )
                })
                .collect();
            if rows.is_empty() {
                "no sessions".to_string()
            } else {
                rows.join("\n")
            }
        }
        SessionsCommand::Show { key } => {
            let session = sessions.get(&key).await?;
            to_json(&json!({
                "session": session.summary().await,
                "messages": session.messages().await,
            }))?
        }
        SessionsCommand::Delete { key } => {
            sessions.get(&key).await?;
            sessions.delete(&key).await?;
            format!("deleted {key}")
        }
        SessionsCommand::Reset { key } => {
            sessions.reset(&key).await?;
            format!("reset {key}")
        }
        SessionsCommand::Prune {
            max_age_days,
            max_count,
        } => {
            let report = sessions
                .prune_stale(
                    max_age_days.unwrap_or(config.session.prune_max_age_days),
                    max_count.unwrap_or(config.session.prune_max_count),
                )
                .await?;
            to_json(&report)?
        }
        SessionsCommand::Current => match sessions.current().await? {
            Some(current) => current.key,
            None => "no current session".to_string(),
        },
        SessionsCommand::Last => match sessions.last_session_key().await? {
            Some(key) => key,
            None => "no sessions".to_string(),
        },
        SessionsCommand::Bind {
            channel,
            conversation,
            key,
        } => {
            sessions.bind(&channel, &conversation, &key).await?;
            format!("bound {channel}/{conversation} -> {key}")
        }
        SessionsCommand::Unbind {
            channel,
            conversation,
        } => {
            if sessions.unbind(&channel, &conversation).await? {
                format!("unbound {channel}/{conversation}")
            } else {
                format!("no binding for {channel}/{conversation}")
            }
        }
        SessionsCommand::Bindings => to_json(&sessions.list_bindings().await?)?,
    };
    Ok(output)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HighclawError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| HighclawError::Internal(format!("failed to encode output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use highclaw_core::ErrorKind;
    use highclaw_session::NewMessage;

    fn temp_config() -> (tempfile::TempDir, HighclawConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HighclawConfig::default();
        config.storage.root_dir = Some(dir.path().display().to_string());
        (dir, config)
    }

    async fn seeded(config: &HighclawConfig) -> SessionManager {
        let sessions = build_session_manager(config);
        sessions
            .get_or_create("agent:main:main", "cli")
            .await
            .unwrap();
        sessions
            .add_message("agent:main:main", NewMessage::user("hello"))
            .await
            .unwrap();
        sessions
    }

    #[tokio::test]
    async fn list_and_show_read_the_store() {
        let (_dir, config) = temp_config();
        let sessions = seeded(&config).await;

        let table = execute(&sessions, &config, SessionsCommand::List { json: false })
            .await
            .unwrap();
        assert!(table.contains("agent:main:main"));

        let listed = execute(&sessions, &config, SessionsCommand::List { json: true })
            .await
            .unwrap();
        let listed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(listed[0]["messageCount"], 1);

        let shown = execute(
            &sessions,
            &config,
            SessionsCommand::Show {
                key: "agent:main:main".into(),
            },
        )
        .await
        .unwrap();
        let shown: serde_json::Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(shown["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn delete_unknown_session_is_not_found() {
        let (_dir, config) = temp_config();
        let sessions = build_session_manager(&config);
        let err = execute(
            &sessions,
            &config,
            SessionsCommand::Delete {
                key: "agent:main:ghost".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_survives_reopen() {
        let (_dir, config) = temp_config();
        let sessions = seeded(&config).await;
        execute(
            &sessions,
            &config,
            SessionsCommand::Delete {
                key: "agent:main:main".into(),
            },
        )
        .await
        .unwrap();

        let reopened = build_session_manager(&config);
        assert_eq!(reopened.hydrate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bind_unbind_and_list_bindings() {
        let (_dir, config) = temp_config();
        let sessions = build_session_manager(&config);

        let out = execute(
            &sessions,
            &config,
            SessionsCommand::Bind {
                channel: "slack".into(),
                conversation: "C1".into(),
                key: "agent:main:proj".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out, "bound slack/C1 -> agent:main:proj");

        let listed = execute(&sessions, &config, SessionsCommand::Bindings)
            .await
            .unwrap();
        assert!(listed.contains("agent:main:proj"));

        let unbind = SessionsCommand::Unbind {
            channel: "slack".into(),
            conversation: "C1".into(),
        };
        let out = execute(&sessions, &config, unbind.clone()).await.unwrap();
        assert_eq!(out, "unbound slack/C1");
        let out = execute(&sessions, &config, unbind).await.unwrap();
        assert_eq!(out, "no binding for slack/C1");
    }

    #[tokio::test]
    async fn prune_uses_configured_defaults() {
        let (_dir, config) = temp_config();
        let sessions = seeded(&config).await;
        let out = execute(
            &sessions,
            &config,
            SessionsCommand::Prune {
                max_age_days: None,
                max_count: None,
            },
        )
        .await
        .unwrap();
        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["pruned"], 0);
        assert_eq!(report["capped"], 0);
    }

    #[tokio::test]
    async fn current_and_last_pointers() {
        let (_dir, config) = temp_config();
        let sessions = build_session_manager(&config);
        assert_eq!(
            execute(&sessions, &config, SessionsCommand::Current)
                .await
                .unwrap(),
            "no current session"
        );

        let sessions = seeded(&config).await;
        sessions.set_current("agent:main:main").await.unwrap();
        assert_eq!(
            execute(&sessions, &config, SessionsCommand::Current)
                .await
                .unwrap(),
            "agent:main:main"
        );
        assert_eq!(
            execute(&sessions, &config, SessionsCommand::Last)
                .await
                .unwrap(),
            "agent:main:main"
        );
    }
}

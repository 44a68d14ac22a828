// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `highclaw shell` command implementation.
//!
//! Interactive REPL against the local session store. Plain lines are sent to
//! the active session through the chat pipeline; slash commands manage
//! sessions.

use std::sync::Arc;

use colored::Colorize;
use highclaw_agent::{ChatOutcome, ChatRequest, ChatService};
use highclaw_config::HighclawConfig;
use highclaw_core::{ChatMessage, HighclawError};
use highclaw_session::SessionSummary;
use highclaw_session::key::{normalize_id, parse_session_key};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::serve::build_chat_service;

/// Channel label recorded on turns typed into the shell.
const SHELL_CHANNEL: &str = "cli";

/// One parsed line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Quit,
    Sessions,
    New(String),
    Switch(String),
    History,
    Reset,
    Delete(String),
    Help,
    Chat(String),
}

impl ShellCommand {
    /// Parse an input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, HighclawError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(Self::Chat(line.to_string())));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        let required = |usage: &str| {
            if arg.is_empty() {
                Err(HighclawError::InvalidInput(format!("usage: {usage}")))
            } else {
                Ok(arg.to_string())
            }
        };

        let parsed = match name {
            "quit" | "exit" => Self::Quit,
            "sessions" => Self::Sessions,
            "new" => Self::New(required("/new <name>")?),
            "switch" => Self::Switch(required("/switch <key>")?),
            "history" => Self::History,
            "reset" => Self::Reset,
            "delete" => Self::Delete(required("/delete <key>")?),
            "help" => Self::Help,
            other => {
                return Err(HighclawError::InvalidInput(format!(
                    "unknown command /{other}, try /help"
                )));
            }
        };
        Ok(Some(parsed))
    }
}

/// Shell state: the chat pipeline plus the session typed lines go to.
pub struct ShellSession {
    chat: Arc<ChatService>,
    active: String,
}

impl ShellSession {
    /// Resume the session named by the current pointer, falling back to the
    /// most recently active session and then the main session.
    pub async fn open(chat: Arc<ChatService>) -> Result<Self, HighclawError> {
        let sessions = chat.sessions();
        let active = match sessions.current().await? {
            Some(current) => current.key,
            None => match sessions.last_session_key().await? {
                Some(key) => key,
                None => sessions.policy().main_session_key(),
            },
        };
        sessions.get_or_create(&active, SHELL_CHANNEL).await?;
        sessions.set_current(&active).await?;
        Ok(Self { chat, active })
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        self.chat.sessions().list().await
    }

    /// Create (or reopen) a named session and make it active. A bare name is
    /// scoped to the configured agent; a full `agent:` key is used as is.
    pub async fn new_session(&mut self, name: &str) -> Result<&str, HighclawError> {
        let key = self.key_for(name)?;
        self.chat
            .sessions()
            .get_or_create(&key, SHELL_CHANNEL)
            .await?;
        self.activate(key).await
    }

    /// Make an existing session active.
    pub async fn switch(&mut self, key: &str) -> Result<&str, HighclawError> {
        let session = self.chat.sessions().get(key).await?;
        self.activate(session.key().to_string()).await
    }

    pub async fn history(&self) -> Result<Vec<ChatMessage>, HighclawError> {
        self.chat.sessions().messages(&self.active).await
    }

    pub async fn reset(&self) -> Result<(), HighclawError> {
        self.chat.sessions().reset(&self.active).await
    }

    /// Delete another session. The active one is refused.
    pub async fn delete(&self, key: &str) -> Result<(), HighclawError> {
        self.chat
            .sessions()
            .delete_inactive(key, &self.active)
            .await
    }

    pub async fn send(&self, text: &str) -> Result<ChatOutcome, HighclawError> {
        self.chat
            .send(ChatRequest::to_session(&self.active, SHELL_CHANNEL, text))
            .await
    }

    async fn activate(&mut self, key: String) -> Result<&str, HighclawError> {
        self.chat.sessions().set_current(&key).await?;
        self.active = key;
        Ok(&self.active)
    }

    fn key_for(&self, name: &str) -> Result<String, HighclawError> {
        let name = name.trim();
        if parse_session_key(name).is_some() {
            return Ok(name.to_string());
        }
        let id = normalize_id(name);
        if id.is_empty() {
            return Err(HighclawError::InvalidInput(format!(
                "`{name}` is not a usable session name"
            )));
        }
        let main = self.chat.sessions().policy().main_session_key();
        let agent = parse_session_key(&main).map_or("main", |(agent, _)| agent);
        Ok(format!("agent:{agent}:{id}"))
    }
}

/// Runs the `highclaw shell` REPL.
pub async fn run_shell(config: HighclawConfig) -> Result<(), HighclawError> {
    let chat = build_chat_service(&config).await?;
    let mut shell = ShellSession::open(Arc::clone(&chat)).await?;

    let mut rl = DefaultEditor::new()
        .map_err(|e| HighclawError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "highclaw shell".bold().green());
    println!("Type {} for commands, {} to exit.", "/help".yellow(), "/quit".yellow());
    println!("session {}", shell.active().cyan());
    println!();

    loop {
        let prompt = format!("{}> ", "highclaw".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                let command = match ShellCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        eprintln!("{}: {e}", "error".red());
                        continue;
                    }
                };
                let _ = rl.add_history_entry(line.trim());
                if command == ShellCommand::Quit {
                    break;
                }
                if let Err(e) = execute(&mut shell, command).await {
                    eprintln!("{}: {e}", "error".red());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C: exit shell.
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D: exit shell.
                break;
            }
            Err(e) => {
                eprintln!("{}: {e}", "readline error".red());
                break;
            }
        }
    }

    let report = chat.sessions().save_all().await;
    if report.failed > 0 {
        eprintln!("{}: {} session(s) could not be saved", "warning".yellow(), report.failed);
    }
    println!("{}", "goodbye".dimmed());
    Ok(())
}

async fn execute(shell: &mut ShellSession, command: ShellCommand) -> Result<(), HighclawError> {
    match command {
        ShellCommand::Quit => {}
        ShellCommand::Help => print_help(),
        ShellCommand::Sessions => {
            let sessions = shell.list().await;
            if sessions.is_empty() {
                println!("{}", "no sessions".dimmed());
            }
            for summary in sessions {
                let marker = if summary.key == shell.active() { "*" } else { " " };
                println!(
                    "{marker} {}  {} messages  last active {}",
                    summary.key.cyan(),
                    summary.message_count,
                    summary.last_activity_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ShellCommand::New(name) => {
            let key = shell.new_session(&name).await?;
            println!("switched to {}", key.cyan());
        }
        ShellCommand::Switch(key) => {
            let key = shell.switch(&key).await?;
            println!("switched to {}", key.cyan());
        }
        ShellCommand::History => {
            let messages = shell.history().await?;
            if messages.is_empty() {
                println!("{}", "no messages yet".dimmed());
            }
            for message in messages {
                println!("{}: {}", message.role.to_string().bold(), message.content);
            }
        }
        ShellCommand::Reset => {
            shell.reset().await?;
            println!("cleared {}", shell.active().cyan());
        }
        ShellCommand::Delete(key) => {
            shell.delete(&key).await?;
            println!("deleted {}", key.cyan());
        }
        ShellCommand::Chat(text) => match shell.send(&text).await? {
            ChatOutcome::Replied { reply, .. } => println!("{reply}\n"),
            ChatOutcome::Recorded { .. } => println!("{}", "(recorded, no reply)".dimmed()),
            ChatOutcome::Duplicate => println!("{}", "(duplicate, ignored)".dimmed()),
        },
    }
    Ok(())
}

fn print_help() {
    println!("  /sessions        list sessions");
    println!("  /new <name>      create a session and switch to it");
    println!("  /switch <key>    switch to an existing session");
    println!("  /history         show the active session's messages");
    println!("  /reset           clear the active session");
    println!("  /delete <key>    delete another session");
    println!("  /quit            leave the shell");
}

// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude runner for the Highclaw gateway.
//!
//! [`AnthropicRunner`] turns a session's bounded history into a single
//! Messages API call. The API wants a system prompt apart from the turns and
//! strictly alternating user/assistant messages that open with a user turn,
//! so the history is reshaped before sending.

pub mod client;
pub mod types;

use async_trait::async_trait;
use highclaw_config::HighclawConfig;
use highclaw_core::{
    AdapterType, AgentRunner, ChatMessage, HealthStatus, HighclawError, PluginAdapter, Role,
    RunReply, RunRequest,
};
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

pub struct AnthropicRunner {
    client: AnthropicClient,
    system_prompt: Option<String>,
    max_tokens: u32,
}

impl AnthropicRunner {
    /// Creates a runner from the given configuration.
    ///
    /// The API key comes from `anthropic.api_key`, else the
    /// `ANTHROPIC_API_KEY` environment variable.
    pub fn new(config: &HighclawConfig) -> Result<Self, HighclawError> {
        let api_key = resolve_api_key(config.anthropic.api_key.as_deref())?;
        let client = AnthropicClient::new(
            &api_key,
            &config.anthropic.api_version,
            &config.anthropic.default_model,
        )?;

        info!(
            model = %config.anthropic.default_model,
            "Anthropic runner initialized"
        );

        Ok(Self::with_client(
            client,
            config.agent.system_prompt.clone(),
            config.anthropic.max_tokens,
        ))
    }

    pub fn with_client(
        client: AnthropicClient,
        system_prompt: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            max_tokens,
        }
    }

    fn to_message_request(&self, request: &RunRequest) -> Result<MessageRequest, HighclawError> {
        let (system, messages) = shape_history(self.system_prompt.as_deref(), &request.history);
        if messages.is_empty() {
            return Err(HighclawError::InvalidInput(format!(
                "session {} has no user message to answer",
                request.session_key
            )));
        }

        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.client.default_model())
            .to_string();

        Ok(MessageRequest {
            model,
            messages,
            system,
            max_tokens: self.max_tokens,
        })
    }
}

#[async_trait]
impl PluginAdapter for AnthropicRunner {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Runner
    }

    async fn health_check(&self) -> Result<HealthStatus, HighclawError> {
        // Probing the API would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), HighclawError> {
        debug!("Anthropic runner shutting down");
        Ok(())
    }
}

#[async_trait]
impl AgentRunner for AnthropicRunner {
    async fn run(&self, request: RunRequest) -> Result<RunReply, HighclawError> {
        let api_request = self.to_message_request(&request)?;
        debug!(
            session_key = %request.session_key,
            model = %api_request.model,
            turns = api_request.messages.len(),
            "sending history to Anthropic"
        );

        let response = self.client.complete_message(&api_request).await?;
        Ok(RunReply {
            reply: response.text(),
            tokens_in: response.usage.input_tokens,
            tokens_out: response.usage.output_tokens,
        })
    }
}

/// Split `history` into a system prompt and API turns.
///
/// System messages are appended to the configured prompt. Consecutive turns
/// with the same role are merged, and anything before the first user turn is
/// dropped.
pub fn shape_history(
    system_prompt: Option<&str>,
    history: &[ChatMessage],
) -> (Option<String>, Vec<ApiMessage>) {
    let mut system: Vec<&str> = system_prompt.into_iter().collect();
    let mut messages: Vec<ApiMessage> = Vec::new();

    for msg in history {
        let content = msg.content.trim();
        if content.is_empty() {
            continue;
        }
        let role = match msg.role {
            Role::System => {
                system.push(content);
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(content);
            }
            None if role == "assistant" => {}
            _ => messages.push(ApiMessage::new(role, content)),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, messages)
}

fn resolve_api_key(config_key: Option<&str>) -> Result<String, HighclawError> {
    if let Some(key) = config_key.map(str::trim)
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }

    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        HighclawError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.into(),
            channel: None,
            sender: None,
            timestamp: 0,
        }
    }

    fn run_request(history: Vec<ChatMessage>) -> RunRequest {
        RunRequest {
            session_key: "agent:main:main".into(),
            agent_id: Some("main".into()),
            model: None,
            thinking_level: None,
            history,
        }
    }

    #[test]
    fn system_messages_fold_into_prompt() {
        let history = vec![
            msg(Role::System, "Be brief."),
            msg(Role::User, "hi"),
        ];
        let (system, messages) = shape_history(Some("You are highclaw."), &history);
        assert_eq!(system.as_deref(), Some("You are highclaw.\n\nBe brief."));
        assert_eq!(messages, vec![ApiMessage::new("user", "hi")]);
    }

    #[test]
    fn consecutive_roles_merge_and_leading_assistant_drops() {
        let history = vec![
            msg(Role::Assistant, "left over"),
            msg(Role::User, "first"),
            msg(Role::User, "second"),
            msg(Role::Assistant, "answer"),
            msg(Role::User, "   "),
            msg(Role::User, "third"),
        ];
        let (system, messages) = shape_history(None, &history);
        assert!(system.is_none());
        assert_eq!(
            messages,
            vec![
                ApiMessage::new("user", "first\n\nsecond"),
                ApiMessage::new("assistant", "answer"),
                ApiMessage::new("user", "third"),
            ]
        );
    }

    #[test]
    fn resolve_api_key_prefers_config() {
        assert_eq!(resolve_api_key(Some("sk-test-123")).unwrap(), "sk-test-123");
    }

    #[test]
    fn resolve_api_key_blank_config_falls_back_to_env() {
        // Succeeds only when ANTHROPIC_API_KEY is set; never returns a blank key.
        if let Ok(key) = resolve_api_key(Some("  ")) {
            assert!(!key.is_empty());
        }
    }

    #[tokio::test]
    async fn run_maps_reply_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-haiku",
                "system": "You are highclaw.",
                "messages": [{"role": "user", "content": "ping"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "pong"}],
                "model": "claude-haiku",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AnthropicClient::new("k", "2023-06-01", "claude-sonnet-4-20250514")
            .unwrap()
            .with_base_url(server.uri())
            .with_retries(0, Duration::from_millis(1));
        let runner = AnthropicRunner::with_client(client, Some("You are highclaw.".into()), 256);

        let mut request = run_request(vec![msg(Role::User, "ping")]);
        request.model = Some("claude-haiku".into());
        let reply = runner.run(request).await.unwrap();

        assert_eq!(
            reply,
            RunReply {
                reply: "pong".into(),
                tokens_in: 12,
                tokens_out: 3,
            }
        );
    }

    #[tokio::test]
    async fn history_without_user_turn_is_rejected() {
        let client = AnthropicClient::new("k", "2023-06-01", "claude-sonnet-4-20250514").unwrap();
        let runner = AnthropicRunner::with_client(client, None, 256);

        let err = runner
            .run(run_request(vec![msg(Role::Assistant, "hello?")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), highclaw_core::ErrorKind::InvalidInput);
    }
}

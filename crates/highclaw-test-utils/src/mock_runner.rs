// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock agent runner for deterministic testing.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use highclaw_core::{
    AdapterType, AgentRunner, HealthStatus, HighclawError, PluginAdapter, RunReply, RunRequest,
};

pub const DEFAULT_REPLY: &str = "mock reply";
pub const MOCK_TOKENS_IN: u32 = 10;
pub const MOCK_TOKENS_OUT: u32 = 20;

/// A runner that answers from a FIFO queue.
///
/// Queued failures surface as [`HighclawError::Runner`]. When the queue is
/// empty, [`DEFAULT_REPLY`] is returned. Every request is recorded.
#[derive(Default)]
pub struct MockRunner {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<RunRequest>>,
    delay: Option<Duration>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner pre-loaded with the given replies.
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(text.into()));
    }

    /// Make the next queued answer a runner failure.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }

    /// Every request seen so far, oldest first.
    pub async fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockRunner {
    fn name(&self) -> &str {
        "mock-runner"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Runner
    }

    async fn health_check(&self) -> Result<HealthStatus, HighclawError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), HighclawError> {
        Ok(())
    }
}

#[async_trait]
impl AgentRunner for MockRunner {
    async fn run(&self, request: RunRequest) -> Result<RunReply, HighclawError> {
        self.requests.lock().await.push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().await.pop_front();
        match next {
            Some(Err(message)) => Err(HighclawError::runner(message)),
            Some(Ok(reply)) => Ok(mock_reply(reply)),
            None => Ok(mock_reply(DEFAULT_REPLY.to_string())),
        }
    }
}

fn mock_reply(reply: String) -> RunReply {
    RunReply {
        reply,
        tokens_in: MOCK_TOKENS_IN,
        tokens_out: MOCK_TOKENS_OUT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RunRequest {
        RunRequest {
            session_key: "agent:main:main".into(),
            agent_id: None,
            model: None,
            thinking_level: None,
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn replies_in_order_then_default() {
        let runner = MockRunner::with_replies(vec!["first".into(), "second".into()]);
        assert_eq!(runner.run(request()).await.unwrap().reply, "first");
        assert_eq!(runner.run(request()).await.unwrap().reply, "second");
        assert_eq!(runner.run(request()).await.unwrap().reply, DEFAULT_REPLY);
        assert_eq!(runner.call_count().await, 3);
    }

    #[tokio::test]
    async fn queued_failure_is_a_runner_error() {
        let runner = MockRunner::new();
        runner.fail_next("boom").await;
        let err = runner.run(request()).await.unwrap_err();
        assert!(matches!(err, HighclawError::Runner { .. }));
        assert!(runner.run(request()).await.is_ok());
    }

    #[tokio::test]
    async fn reports_token_usage() {
        let reply = MockRunner::new().run(request()).await.unwrap();
        assert_eq!((reply.tokens_in, reply.tokens_out), (10, 20));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_holds_the_reply() {
        let runner = MockRunner::new().with_delay(Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        runner.run(request()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}

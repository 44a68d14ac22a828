// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent runner trait: turns a bounded history into a reply.

use async_trait::async_trait;

use crate::error::HighclawError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{RunReply, RunRequest};

/// The LLM-backed agent that answers a session.
///
/// Callers enforce deadlines; implementations should not apply their own
/// overall timeout beyond transport-level limits.
#[async_trait]
pub trait AgentRunner: PluginAdapter {
    async fn run(&self, request: RunRequest) -> Result<RunReply, HighclawError>;
}

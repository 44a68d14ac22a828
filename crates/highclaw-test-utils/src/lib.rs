// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Highclaw integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockRunner`] - Agent runner with queued replies, failures and delays
//! - [`MockChannel`] - Channel adapter with event injection and delivery capture
//! - [`TestHarness`] - A chat pipeline over a temp session store

pub mod harness;
pub mod mock_channel;
pub mod mock_runner;

pub use harness::TestHarness;
pub use mock_channel::MockChannel;
pub use mock_runner::MockRunner;

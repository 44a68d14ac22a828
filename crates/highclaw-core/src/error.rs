// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Highclaw gateway.

use strum::Display;
use thiserror::Error;

/// The primary error type used across all Highclaw crates and adapter traits.
#[derive(Debug, Error)]
pub enum HighclawError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// A session key that is neither live in the registry nor on disk.
    #[error("session not found: {key}")]
    NotFound { key: String },

    /// Caller-supplied input was rejected (empty key, unknown role, blank content).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation is forbidden in the calling context.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Filesystem or snapshot encoding failure in the session store.
    #[error("storage error: {message}")]
    Storage {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Channel adapter errors (connection failure, delivery failure).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Agent runner errors (API failure, malformed response).
    #[error("runner error: {message}")]
    Runner {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classification shared by the HTTP and RPC surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    PolicyViolation,
    IoError,
    Config,
    Channel,
    Runner,
    Timeout,
    Internal,
}

impl HighclawError {
    /// Shorthand for a [`HighclawError::NotFound`] on `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Wrap a filesystem or serialization error with context.
    pub fn storage(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a runner failure with context.
    pub fn runner(message: impl Into<String>) -> Self {
        Self::Runner {
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::Storage { .. } => ErrorKind::IoError,
            Self::Channel { .. } => ErrorKind::Channel,
            Self::Runner { .. } => ErrorKind::Runner,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

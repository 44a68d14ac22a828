// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session routing and persistence for the Highclaw gateway.
//!
//! Maps every inbound interaction to a canonical session key, keeps at most
//! one live [`Session`] per key, writes each mutation through to a JSON
//! snapshot on disk, dedupes chat writes by idempotency key, and prunes
//! stale sessions by age and count.
//!
//! Lock order is registry, then session, then file I/O.

mod fs;

pub mod eviction;
pub mod idempotency;
pub mod key;
pub mod manager;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;

pub use eviction::PruneReport;
pub use idempotency::{ClaimOutcome, DEFAULT_IDEMPOTENCY_TTL, IdempotencyGate};
pub use key::{DEFAULT_SESSION_KEY, IdentityLinks, KeyPolicy, derive_session_key};
pub use manager::{AutoSaveReport, SessionManager};
pub use registry::SessionRegistry;
pub use router::{RouteRequest, SessionRouter};
pub use session::{NewMessage, Session, SessionPatch, SessionSnapshot, SessionSummary};
pub use store::{CurrentSession, SessionBinding, SessionStore, sanitize_key};

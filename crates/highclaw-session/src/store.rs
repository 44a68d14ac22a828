// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable session snapshots, the current-session pointer, and bindings.
//!
//! Layout under the store root:
//!
//! ```text
//! sessions/<sanitized-key>.json   one SessionSnapshot
//! state/current_session.json      { key, updatedAt }
//! state/session_bindings.json     { bindings: { "<channel>|<conversation>": key } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use highclaw_core::{ChatMessage, HighclawError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::fs::{ensure_dir, read_optional, remove_if_exists, write_atomic};
use crate::key::DEFAULT_SESSION_KEY;
use crate::session::{Session, SessionSnapshot, now_millis};

/// Default permission bits for snapshot and state files.
pub const DEFAULT_FILE_MODE: u32 = 0o600;

const SESSIONS_DIR: &str = "sessions";
const STATE_DIR: &str = "state";
const CURRENT_FILE: &str = "current_session.json";
const BINDINGS_FILE: &str = "session_bindings.json";
const MAX_FILE_NAME_BYTES: usize = 200;
const SNAPSHOT_EXT: &str = ".json";
/// Hex digits of the key digest appended to rewritten stems.
const KEY_DIGEST_HEX: usize = 16;

/// A manual `(channel, conversation) -> session` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBinding {
    pub channel: String,
    pub conversation: String,
    pub session_key: String,
}

/// The `state/current_session.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSession {
    pub key: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BindingsFile {
    #[serde(default)]
    bindings: BTreeMap<String, String>,
}

/// File-backed store rooted at one directory; one process per root.
#[derive(Debug)]
pub struct SessionStore {
    root: PathBuf,
    file_mode: u32,
    // Serializes read-modify-write of the state files.
    state_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_mode: DEFAULT_FILE_MODE,
            state_lock: Mutex::new(()),
        }
    }

    pub fn with_file_mode(mut self, file_mode: u32) -> Self {
        self.file_mode = file_mode;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}{SNAPSHOT_EXT}", sanitize_key(key)))
    }

    // --- Snapshots ---

    /// Persist `session`, holding its lock across encoding and the write.
    ///
    /// A session that has been deleted or evicted is `NotFound`; writers that
    /// still hold it cannot bring its snapshot back.
    pub async fn save(&self, session: &Session) -> Result<(), HighclawError> {
        let state = session.lock().await;
        if state.is_removed() {
            return Err(HighclawError::not_found(session.key()));
        }
        let snapshot = state.to_snapshot(session.key());
        self.write_snapshot(&snapshot).await
    }

    pub async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), HighclawError> {
        self.write_snapshot(snapshot).await
    }

    async fn write_snapshot(&self, snapshot: &SessionSnapshot) -> Result<(), HighclawError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| HighclawError::storage("encode session snapshot", e))?;
        let path = self.session_path(&snapshot.key);
        write_atomic(&path, &bytes, self.file_mode)
            .await
            .map_err(|e| HighclawError::storage(format!("write {}", path.display()), e))?;
        debug!(session_key = %snapshot.key, messages = snapshot.history.len(), "session saved");
        Ok(())
    }

    /// Load one session, restoring its message log from `history`.
    pub async fn load(&self, key: &str) -> Result<Session, HighclawError> {
        self.load_snapshot(key).await.map(Session::from_snapshot)
    }

    pub async fn load_snapshot(&self, key: &str) -> Result<SessionSnapshot, HighclawError> {
        let path = self.session_path(key);
        let bytes = read_optional(&path)
            .await
            .map_err(|e| HighclawError::storage(format!("read {}", path.display()), e))?
            .ok_or_else(|| HighclawError::not_found(key))?;
        let snapshot = decode_snapshot(&bytes)
            .map_err(|e| HighclawError::storage(format!("decode {}", path.display()), e))?;

        // Two long keys may truncate to the same file name.
        if snapshot.key != key {
            return Err(HighclawError::not_found(key));
        }
        Ok(snapshot)
    }

    /// Every readable snapshot on disk. Corrupt entries are skipped.
    pub async fn load_all(&self) -> Result<Vec<SessionSnapshot>, HighclawError> {
        let dir = self.sessions_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HighclawError::storage(
                    format!("scan {}", dir.display()),
                    e,
                ));
            }
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HighclawError::storage(format!("scan {}", dir.display()), e))?
        {
            let path = entry.path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SNAPSHOT_EXT) && !n.starts_with('.'));
            if !is_snapshot {
                continue;
            }

            let decoded = match tokio::fs::read(&path).await {
                Ok(bytes) => decode_snapshot(&bytes).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match decoded {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping unreadable session snapshot");
                }
            }
        }
        Ok(snapshots)
    }

    /// Remove a session's snapshot; a missing file is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), HighclawError> {
        let path = self.session_path(key);
        remove_if_exists(&path)
            .await
            .map(|_| ())
            .map_err(|e| HighclawError::storage(format!("delete {}", path.display()), e))
    }

    /// Mark a live session removed and unlink its snapshot under its lock.
    pub async fn delete_session(&self, session: &Session) -> Result<(), HighclawError> {
        let mut state = session.lock().await;
        state.mark_removed();
        self.delete(session.key()).await
    }

    /// Upsert a snapshot from an externally held history, keeping the
    /// original `createdAt` if a snapshot already exists, then mark it current.
    pub async fn save_from_history(
        &self,
        key: &str,
        channel: &str,
        agent_id: Option<&str>,
        model: Option<&str>,
        history: Vec<ChatMessage>,
    ) -> Result<(), HighclawError> {
        require_non_blank(key, "session key")?;

        let now = now_millis();
        let existing = match self.load_snapshot(key).await {
            Ok(snapshot) => Some(snapshot),
            Err(HighclawError::NotFound { .. }) => None,
            Err(e) => {
                warn!(session_key = %key, error = %e, "replacing unreadable snapshot");
                None
            }
        };
        let created_at = existing.as_ref().map_or(now, |s| s.created_at);

        let snapshot = SessionSnapshot {
            key: key.to_string(),
            channel: channel.to_string(),
            agent_id: non_blank(agent_id)
                .or_else(|| existing.as_ref().and_then(|s| s.agent_id.clone())),
            model: non_blank(model).or_else(|| existing.as_ref().and_then(|s| s.model.clone())),
            thinking_level: existing.as_ref().and_then(|s| s.thinking_level.clone()),
            verbose_level: existing.as_ref().and_then(|s| s.verbose_level.clone()),
            message_count: history.len(),
            created_at,
            last_activity_at: now,
            group_activation: existing.as_ref().and_then(|s| s.group_activation),
            history,
        };
        self.write_snapshot(&snapshot).await?;
        self.set_current(key).await
    }

    // --- Bindings ---

    /// The bound session for `(channel, conversation)`, or the default key.
    pub async fn resolve_session(&self, channel: &str, conversation: &str) -> String {
        if channel.trim().is_empty() || conversation.trim().is_empty() {
            return DEFAULT_SESSION_KEY.to_string();
        }
        match self.read_bindings().await {
            Ok(file) => file
                .bindings
                .get(&binding_key(channel, conversation))
                .cloned()
                .unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string()),
            Err(e) => {
                warn!(error = %e, "session bindings unreadable, using default route");
                DEFAULT_SESSION_KEY.to_string()
            }
        }
    }

    pub async fn set_binding(
        &self,
        channel: &str,
        conversation: &str,
        session_key: &str,
    ) -> Result<(), HighclawError> {
        require_non_blank(channel, "channel")?;
        require_non_blank(conversation, "conversation")?;
        require_non_blank(session_key, "session key")?;

        let _guard = self.state_lock.lock().await;
        let mut file = self.read_bindings().await?;
        file.bindings
            .insert(binding_key(channel, conversation), session_key.trim().to_string());
        self.write_bindings(&file).await
    }

    /// Drop a binding. Returns whether one existed.
    pub async fn remove_binding(
        &self,
        channel: &str,
        conversation: &str,
    ) -> Result<bool, HighclawError> {
        let _guard = self.state_lock.lock().await;
        let mut file = self.read_bindings().await?;
        let removed = file
            .bindings
            .remove(&binding_key(channel, conversation))
            .is_some();
        if removed {
            self.write_bindings(&file).await?;
        }
        Ok(removed)
    }

    /// All bindings sorted by channel, then conversation.
    pub async fn list_bindings(&self) -> Result<Vec<SessionBinding>, HighclawError> {
        let file = self.read_bindings().await?;
        let mut bindings: Vec<SessionBinding> = file
            .bindings
            .into_iter()
            .filter_map(|(k, session_key)| {
                let (channel, conversation) = k.split_once('|')?;
                Some(SessionBinding {
                    channel: channel.to_string(),
                    conversation: conversation.to_string(),
                    session_key,
                })
            })
            .collect();
        bindings.sort_by(|a, b| {
            a.channel
                .cmp(&b.channel)
                .then_with(|| a.conversation.cmp(&b.conversation))
        });
        Ok(bindings)
    }

    async fn read_bindings(&self) -> Result<BindingsFile, HighclawError> {
        let path = self.state_dir().join(BINDINGS_FILE);
        match read_optional(&path)
            .await
            .map_err(|e| HighclawError::storage(format!("read {}", path.display()), e))?
        {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| HighclawError::storage(format!("decode {}", path.display()), e)),
            None => Ok(BindingsFile::default()),
        }
    }

    async fn write_bindings(&self, file: &BindingsFile) -> Result<(), HighclawError> {
        let path = self.state_dir().join(BINDINGS_FILE);
        self.write_state(&path, file).await
    }

    // --- Current-session pointer ---

    /// Point the current session at `key`; a blank key clears the pointer.
    pub async fn set_current(&self, key: &str) -> Result<(), HighclawError> {
        let path = self.state_dir().join(CURRENT_FILE);
        let _guard = self.state_lock.lock().await;

        if key.trim().is_empty() {
            return remove_if_exists(&path)
                .await
                .map(|_| ())
                .map_err(|e| HighclawError::storage(format!("delete {}", path.display()), e));
        }

        let pointer = CurrentSession {
            key: key.trim().to_string(),
            updated_at: now_millis(),
        };
        self.write_state(&path, &pointer).await
    }

    pub async fn current(&self) -> Result<Option<CurrentSession>, HighclawError> {
        let path = self.state_dir().join(CURRENT_FILE);
        let Some(bytes) = read_optional(&path)
            .await
            .map_err(|e| HighclawError::storage(format!("read {}", path.display()), e))?
        else {
            return Ok(None);
        };
        let pointer: CurrentSession = serde_json::from_slice(&bytes)
            .map_err(|e| HighclawError::storage(format!("decode {}", path.display()), e))?;
        Ok((!pointer.key.is_empty()).then_some(pointer))
    }

    async fn write_state<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), HighclawError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| HighclawError::storage("encode state file", e))?;
        write_atomic(path, &bytes, self.file_mode)
            .await
            .map_err(|e| HighclawError::storage(format!("write {}", path.display()), e))
    }

    /// Create the `sessions/` and `state/` directories.
    pub async fn init(&self) -> Result<(), HighclawError> {
        for dir in [self.sessions_dir(), self.state_dir()] {
            ensure_dir(&dir)
                .await
                .map_err(|e| HighclawError::storage(format!("create {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// Map a session key onto a safe file stem: `/ \ : * ? " < > |` and control
/// characters become `_`, and `<stem>.json` fits in 200 bytes.
///
/// Keys that survive unchanged are used as is. Any key that had to be
/// rewritten or cut gets `-<16 hex>` of its SHA-256 appended, so
/// `agent:main:main` and `agent_main_main` never share a file.
pub fn sanitize_key(key: &str) -> String {
    let mut stem: String = key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let max_stem = MAX_FILE_NAME_BYTES - SNAPSHOT_EXT.len();
    if !stem.is_empty() && stem == key && stem.len() <= max_stem {
        return stem;
    }

    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let suffix = &digest[..KEY_DIGEST_HEX];
    let mut cut = stem.len().min(max_stem - KEY_DIGEST_HEX - 1);
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    stem.truncate(cut);
    if stem.is_empty() {
        stem.push('_');
    }
    format!("{stem}-{suffix}")
}

fn binding_key(channel: &str, conversation: &str) -> String {
    format!("{}|{}", channel.trim().to_lowercase(), conversation.trim())
}

fn decode_snapshot(bytes: &[u8]) -> Result<SessionSnapshot, serde_json::Error> {
    let mut snapshot: SessionSnapshot = serde_json::from_slice(bytes)?;
    snapshot.message_count = snapshot.history.len();
    Ok(snapshot)
}

fn require_non_blank(value: &str, what: &str) -> Result<(), HighclawError> {
    if value.trim().is_empty() {
        return Err(HighclawError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

//! Persisted browser session: cookies plus per-origin localStorage.
//!
//! The state file is the only thing that survives between runs. A missing,
//! unreadable or foreign-version file is treated as "no session" so the next
//! run simply logs in again. Writes go through a temp file in the same
//! directory and are renamed over the old file, so an interrupted save never
//! leaves a half-written session behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::SessionStoreError;

pub const SESSION_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginStorage {
    pub origin: String,
    #[serde(rename = "localStorage", default)]
    pub local_storage: Vec<StorageEntry>,
}

/// Opaque browser-context state. Whether it still grants access is only
/// known once it has been tried against the live portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

impl SessionState {
    pub fn new(cookies: Vec<Cookie>, origins: Vec<OriginStorage>) -> Self {
        SessionState {
            version: SESSION_FORMAT_VERSION,
            cookies,
            origins,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session. Never fails: anything unusable is `None`.
    pub fn load(&self) -> Option<SessionState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "[SESSION] No stored session");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "[SESSION] Stored session unreadable, ignoring it");
                return None;
            }
        };

        let state: SessionState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "[SESSION] Stored session is corrupt, ignoring it");
                return None;
            }
        };

        if state.version != SESSION_FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                found = state.version,
                expected = SESSION_FORMAT_VERSION,
                "[SESSION] Stored session has an unknown format version, ignoring it"
            );
            return None;
        }

        info!(
            path = %self.path.display(),
            cookies = state.cookies.len(),
            origins = state.origins.len(),
            "[SESSION] Loaded stored session"
        );
        Some(state)
    }

    /// Atomically replaces the stored session.
    pub fn save(&self, state: &SessionState) -> Result<(), SessionStoreError> {
        self.stage(state)?.commit()
    }

    /// Writes `state` next to the session file without touching it yet.
    ///
    /// Dropping the returned value without calling [`StagedSession::commit`]
    /// discards the write and leaves the previous session in place.
    pub fn stage(&self, state: &SessionState) -> Result<StagedSession, SessionStoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // NamedTempFile is created owner-only (0600 on unix).
        let mut temp = NamedTempFile::new_in(&dir)?;
        let json = serde_json::to_string_pretty(state)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        debug!(temp = %temp.path().display(), "[SESSION] Staged session state");
        Ok(StagedSession {
            temp,
            target: self.path.clone(),
        })
    }
}

#[derive(Debug)]
pub struct StagedSession {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedSession {
    pub fn commit(self) -> Result<(), SessionStoreError> {
        let target = self.target;
        self.temp.persist(&target).map_err(|e| e.error)?;
        info!(path = %target.display(), "[SESSION] Saved session state");
        Ok(())
    }
}

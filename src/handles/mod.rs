//! Locally-scoped handles to previewable content.
//!
//! A handle is a temporary file exposed to the presentation layer as a
//! `file://` URI. Handles belong to the processing session that created them
//! and are deleted when that session is released or the registry is dropped.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use tempfile::{Builder, TempDir, TempPath};
use url::Url;

use crate::utils::sanitize_filename;

pub type SessionId = u64;

pub struct HandleRegistry {
    // Dropped before `dir` so files are removed ahead of their directory
    sessions: Mutex<HashMap<SessionId, Vec<TempPath>>>,
    dir: TempDir,
}

impl HandleRegistry {
    /// Create a registry backed by a fresh directory under the system temp dir
    pub fn new() -> io::Result<Self> {
        let dir = Builder::new().prefix("accessify-").tempdir()?;
        Ok(Self::with_dir(dir))
    }

    /// Create a registry backed by a fresh directory under `parent`
    pub fn in_dir(parent: &Path) -> io::Result<Self> {
        let dir = Builder::new().prefix("accessify-").tempdir_in(parent)?;
        Ok(Self::with_dir(dir))
    }

    fn with_dir(dir: TempDir) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `bytes` to a new handle owned by `session` and return its URI
    pub fn create(&self, session: SessionId, name: &str, bytes: &[u8]) -> io::Result<String> {
        let suffix = format!("-{}", sanitize_filename(name));
        let mut file = Builder::new()
            .prefix(&format!("s{}-", session))
            .suffix(&suffix)
            .tempfile_in(self.dir.path())?;
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        let uri = Url::from_file_path(&path)
            .map(String::from)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "handle path is not absolute"))?;

        self.lock().entry(session).or_default().push(path);
        tracing::debug!(session, "Created local handle {}", uri);

        Ok(uri)
    }

    /// Delete every handle owned by `session`
    pub fn release_session(&self, session: SessionId) -> usize {
        let released = self.lock().remove(&session).unwrap_or_default();
        let count = released.len();
        for path in released {
            if let Err(e) = path.close() {
                tracing::warn!(session, "Failed to release local handle: {}", e);
            }
        }
        if count > 0 {
            tracing::debug!(session, count, "Released local handles");
        }
        count
    }

    /// Delete every handle of every session
    pub fn release_all(&self) -> usize {
        let sessions: Vec<SessionId> = self.lock().keys().copied().collect();
        sessions
            .into_iter()
            .map(|session| self.release_session(session))
            .sum()
    }

    /// Number of handles currently alive
    pub fn live_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Vec<TempPath>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

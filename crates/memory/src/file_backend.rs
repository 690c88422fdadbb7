//! File-based session store: one JSON document per session.
//!
//! Storage location: `~/.steward/sessions/<session-id>.json`
//!
//! Writes go to a temporary file that is renamed over the old one, so a
//! crash mid-write never leaves a half-written session behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use steward_core::collaborator::SessionStore;
use steward_core::error::StoreError;
use steward_core::session::{Session, SessionId};
use tracing::{debug, warn};

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(path = %dir.display(), "File session store ready");
        Self { dir }
    }

    /// Default directory: `~/.steward/sessions`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".steward").join("sessions")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Session ids become file names, so only a safe alphabet is accepted.
    fn path_for(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        let raw = id.as_str();
        let safe = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(StoreError::Storage(format!(
                "session id {raw:?} is not usable as a file name"
            )));
        }
        Ok(self.dir.join(format!("{raw}.json")))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let path = self.path_for(id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            warn!(session_id = %id, error = %e, "Corrupt session file");
            StoreError::Corrupt {
                session_id: id.to_string(),
                reason: e.to_string(),
            }
        })
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.path_for(&session.id)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create session directory: {e}"))
        })?;

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize session: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write session file: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace session file: {e}")))?;

        debug!(session_id = %session.id, turns = session.len(), "Session saved");
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}

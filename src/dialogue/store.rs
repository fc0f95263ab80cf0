//! [`SessionStore`] — one JSON file per session plus `sessions_index.json`.
//!
//! ```text
//! <storage_dir>/
//!   sessions_index.json      newest first, at most `index_limit` entries
//!   <session_id>.json        full Session document
//! ```
//!
//! All file access goes through a single async mutex that also guards the
//! in-memory copy of the index.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

use super::session::{Session, SessionSummary};

pub const INDEX_FILE: &str = "sessions_index.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed session data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid session id {0:?}")]
    InvalidId(String),
}

pub struct SessionStore {
    dir: PathBuf,
    index_limit: usize,
    index: Mutex<Vec<SessionSummary>>,
}

impl SessionStore {
    /// Open (creating if needed) the store under `dir`.  An unreadable
    /// index is logged and replaced by an empty one.
    pub async fn open(dir: impl Into<PathBuf>, index_limit: usize) -> Result<Self, SessionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;

        let index = match fs::read(dir.join(INDEX_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("sessions: ignoring unreadable index in {}: {e}", dir.display());
                Vec::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        log::debug!("sessions: opened {} ({} indexed)", dir.display(), index.len());
        Ok(Self {
            dir,
            index_limit: index_limit.max(1),
            index: Mutex::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create, persist and index a fresh session.
    pub async fn create(&self) -> Result<Session, SessionError> {
        let session = Session::new();
        let mut index = self.index.lock().await;
        self.write_session(&session).await?;
        index.insert(0, session.summary());
        index.truncate(self.index_limit);
        self.write_index(&index).await?;
        log::info!("sessions: created {}", session.session_id);
        Ok(session)
    }

    /// `Ok(None)` when no such session exists.
    pub async fn load(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        let path = self.session_path(session_id)?;
        let _index = self.index.lock().await;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `session` and refresh its index entry in place (new sessions go
    /// to the front).
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        self.session_path(&session.session_id)?;
        let mut index = self.index.lock().await;
        self.write_session(session).await?;

        let summary = session.summary();
        match index.iter_mut().find(|s| s.session_id == summary.session_id) {
            Some(entry) => *entry = summary,
            None => index.insert(0, summary),
        }
        index.truncate(self.index_limit);
        self.write_index(&index).await
    }

    /// Remove the file and the index entry.  Returns whether anything existed.
    pub async fn delete(&self, session_id: &str) -> Result<bool, SessionError> {
        let path = self.session_path(session_id)?;
        let mut index = self.index.lock().await;

        let removed_file = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let before = index.len();
        index.retain(|s| s.session_id != session_id);
        let removed_entry = index.len() != before;
        if removed_entry {
            self.write_index(&index).await?;
        }

        if removed_file || removed_entry {
            log::info!("sessions: deleted {session_id}");
        }
        Ok(removed_file || removed_entry)
    }

    /// Newest `limit` index entries.
    pub async fn list(&self, limit: usize) -> Vec<SessionSummary> {
        self.index.lock().await.iter().take(limit).cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    fn session_path(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SessionError::InvalidId(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    async fn write_session(&self, session: &Session) -> Result<(), SessionError> {
        let path = self.session_path(&session.session_id)?;
        fs::write(path, serde_json::to_vec_pretty(session)?).await?;
        Ok(())
    }

    async fn write_index(&self, index: &[SessionSummary]) -> Result<(), SessionError> {
        fs::write(self.dir.join(INDEX_FILE), serde_json::to_vec_pretty(index)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::dialogue::{Message, Role};

    async fn store(limit: usize) -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path().join("sessions"), limit)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_writes_file_and_index() {
        let (_dir, store) = store(100).await;
        let session = store.create().await.unwrap();

        assert!(store.dir().join(format!("{}.json", session.session_id)).exists());
        assert!(store.dir().join(INDEX_FILE).exists());
        let listed = store.list(10).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, session.session_id);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let (_dir, store) = store(100).await;
        let mut session = store.create().await.unwrap();
        session.add_message(Message::new(Role::User, "remember the milk"));
        store.save(&session).await.unwrap();

        let loaded = store.load(&session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(store.list(1).await[0].title, "remember the milk");
        assert_eq!(store.list(1).await[0].preview, "remember the milk");
    }

    #[tokio::test]
    async fn index_is_newest_first_and_capped() {
        let (_dir, store) = store(2).await;
        let a = store.create().await.unwrap();
        let b = store.create().await.unwrap();
        let c = store.create().await.unwrap();

        let ids: Vec<_> = store.list(10).await.into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec![c.session_id, b.session_id]);
        assert!(!ids.contains(&a.session_id));
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = SessionStore::open(dir.path(), 10).await.unwrap();
            store.create().await.unwrap().session_id
        };
        let reopened = SessionStore::open(dir.path(), 10).await.unwrap();
        assert_eq!(reopened.list(10).await[0].session_id, id);
    }

    #[tokio::test]
    async fn corrupt_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"{not json").unwrap();
        let store = SessionStore::open(dir.path(), 10).await.unwrap();
        assert!(store.list(10).await.is_empty());
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let (_dir, store) = store(10).await;
        assert!(store.load("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_file_and_entry() {
        let (_dir, store) = store(10).await;
        let session = store.create().await.unwrap();

        assert!(store.delete(&session.session_id).await.unwrap());
        assert!(store.list(10).await.is_empty());
        assert!(store.load(&session.session_id).await.unwrap().is_none());
        assert!(!store.delete(&session.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let (_dir, store) = store(10).await;
        for id in ["../escape", "a/b", "", "x.json"] {
            assert!(matches!(
                store.load(id).await,
                Err(SessionError::InvalidId(_))
            ));
        }
    }
}

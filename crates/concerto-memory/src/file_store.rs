use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use concerto_core::error::{MemoryError, MemoryOperation, MemoryResult};
use concerto_core::identifiers::SessionId;
use concerto_core::message::Message;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::store::{MemoryStore, tail};

const LOG_EXTENSION: &str = "jsonl";

/// Persistent session memory: one JSON Lines file per session.
///
/// # File layout
///
/// Each session is stored as `<dir>/<session-id>.jsonl`, one serialized
/// [`Message`] per line, in append order. Files are only ever appended to.
///
/// # Buffering
///
/// `append` updates the in-memory log and marks the message as pending; the
/// pending tail is written on [`MemoryStore::flush`]. Messages that were never
/// flushed are lost if the process exits, so owners must flush on shutdown
/// (the runtime context does this when it closes).
///
/// # Loading
///
/// An existing log is read the first time its session is touched, not when
/// the store is opened.
///
/// # Concurrent file access
///
/// Two `FileStore` instances pointing at the same directory will interleave
/// writes. Share one instance (it is cheap to clone) instead.
#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    logs: Arc<DashMap<SessionId, Arc<Mutex<SessionLog>>>>,
}

#[derive(Default)]
struct SessionLog {
    loaded: bool,
    messages: Vec<Message>,
    /// Number of messages at the end of `messages` not yet on disk
    pending: usize,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> MemoryResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            tracing::error!(path = ?dir, error = %e, "Failed to create memory directory");
            MemoryError::storage(MemoryOperation::Load, dir.display().to_string(), e)
        })?;
        tracing::debug!(path = ?dir, "Opened file memory store");
        Ok(Self {
            dir,
            logs: Arc::new(DashMap::new()),
        })
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.{}", session, LOG_EXTENSION))
    }

    fn handle(&self, session: &SessionId) -> Arc<Mutex<SessionLog>> {
        self.logs.entry(session.clone()).or_default().clone()
    }

    async fn ensure_loaded(&self, session: &SessionId, log: &mut SessionLog) -> MemoryResult<()> {
        if log.loaded {
            return Ok(());
        }
        let path = self.path_for(session);
        let mut persisted = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_log(session, &contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "Session log not found, starting fresh");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to read session log");
                return Err(MemoryError::storage(
                    MemoryOperation::Load,
                    session.as_str(),
                    e,
                ));
            }
        };
        tracing::debug!(session = %session, entries = persisted.len(), "Loaded session log");
        // Anything appended before the load stays after the persisted history.
        persisted.append(&mut log.messages);
        log.messages = persisted;
        log.loaded = true;
        Ok(())
    }

    async fn persist_pending(&self, session: &SessionId, log: &mut SessionLog) -> MemoryResult<()> {
        if log.pending == 0 {
            return Ok(());
        }
        let start = log.messages.len() - log.pending;
        let mut buf = String::new();
        for message in &log.messages[start..] {
            let line = serde_json::to_string(message).map_err(|e| {
                tracing::error!(session = %session, error = %e, "Failed to serialize message");
                MemoryError::Serialization {
                    session: session.to_string(),
                    message: e.to_string(),
                }
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let path = self.path_for(session);
        let storage_err = |e: std::io::Error| {
            tracing::error!(path = ?path, error = %e, "Failed to write session log");
            MemoryError::storage(MemoryOperation::Flush, session.as_str(), e)
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(storage_err)?;
        file.write_all(buf.as_bytes()).await.map_err(storage_err)?;
        file.sync_data().await.map_err(storage_err)?;

        tracing::debug!(session = %session, entries = log.pending, "Persisted session log");
        log.pending = 0;
        Ok(())
    }

    async fn sessions_on_disk(&self) -> MemoryResult<Vec<SessionId>> {
        let list_err =
            |e: std::io::Error| MemoryError::storage(MemoryOperation::List, self.dir.display().to_string(), e);
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(list_err)?;
        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match SessionId::parse(stem) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!(path = ?path, error = %e, "Ignoring file with invalid session name"),
            }
        }
        Ok(sessions)
    }
}

fn parse_log(session: &SessionId, contents: &str) -> MemoryResult<Vec<Message>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<Message>(line).map_err(|e| {
                tracing::error!(session = %session, line = idx + 1, error = %e, "Corrupt session log entry");
                MemoryError::Corrupt {
                    session: session.to_string(),
                    line: idx + 1,
                    message: e.to_string(),
                }
            })
        })
        .collect()
}

#[async_trait]
impl MemoryStore for FileStore {
    async fn append(&self, session: &SessionId, message: Message) -> MemoryResult<()> {
        let handle = self.handle(session);
        let mut log = handle.lock().await;
        self.ensure_loaded(session, &mut log).await?;
        log.messages.push(message);
        log.pending += 1;
        Ok(())
    }

    async fn read(&self, session: &SessionId, window: Option<usize>) -> MemoryResult<Vec<Message>> {
        let handle = self.handle(session);
        let mut log = handle.lock().await;
        self.ensure_loaded(session, &mut log).await?;
        Ok(tail(&log.messages, window))
    }

    async fn flush(&self) -> MemoryResult<()> {
        // Collect handles first so no map guard is held across an await.
        let handles: Vec<(SessionId, Arc<Mutex<SessionLog>>)> = self
            .logs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (session, handle) in handles {
            let mut log = handle.lock().await;
            self.persist_pending(&session, &mut log).await?;
        }
        Ok(())
    }

    async fn sessions(&self) -> MemoryResult<Vec<SessionId>> {
        let mut sessions = self.sessions_on_disk().await?;
        for entry in self.logs.iter() {
            if !sessions.contains(entry.key()) {
                sessions.push(entry.key().clone());
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

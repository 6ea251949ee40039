//! Transient session memory.

use async_trait::async_trait;
use concerto_core::error::MemoryResult;
use concerto_core::identifiers::SessionId;
use concerto_core::message::Message;
use dashmap::DashMap;
use std::sync::Arc;

use crate::store::{MemoryStore, tail};

/// Fast, transient memory implementation backed by a concurrent map.
///
/// Suitable for development, testing and single-process runs where history
/// does not need to survive a restart. Clones share the same logs.
///
/// ```rust
/// use concerto_core::{Message, SessionId};
/// use concerto_memory::{InMemoryStore, MemoryStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// let session = SessionId::generate();
/// store.append(&session, Message::user("hello")).await.unwrap();
///
/// let log = store.read(&session, None).await.unwrap();
/// assert_eq!(log[0].content(), "hello");
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    logs: Arc<DashMap<SessionId, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored for a session.
    pub fn len(&self, session: &SessionId) -> usize {
        self.logs.get(session).map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.logs.iter().all(|log| log.is_empty())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, session: &SessionId, message: Message) -> MemoryResult<()> {
        // The entry guard holds the shard lock, so appends to one session
        // are serialized.
        self.logs.entry(session.clone()).or_default().push(message);
        Ok(())
    }

    async fn read(&self, session: &SessionId, window: Option<usize>) -> MemoryResult<Vec<Message>> {
        Ok(self
            .logs
            .get(session)
            .map(|log| tail(&log, window))
            .unwrap_or_default())
    }

    async fn flush(&self) -> MemoryResult<()> {
        Ok(())
    }

    async fn sessions(&self) -> MemoryResult<Vec<SessionId>> {
        let mut sessions: Vec<SessionId> = self.logs.iter().map(|e| e.key().clone()).collect();
        sessions.sort();
        Ok(sessions)
    }

    fn backend(&self) -> &'static str {
        "in_memory"
    }
}

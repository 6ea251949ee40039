//! The session memory contract.

use async_trait::async_trait;
use concerto_core::error::MemoryResult;
use concerto_core::identifiers::SessionId;
use concerto_core::message::Message;

/// Append-only, per-session message log.
///
/// Implementations must serialize appends per session and return reads in
/// append order. Reads never mutate the log.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append one message to the session log.
    async fn append(&self, session: &SessionId, message: Message) -> MemoryResult<()>;

    /// Read the session log. `window = Some(k)` returns the last `k` messages,
    /// `None` the whole log. Unknown sessions read as empty.
    async fn read(&self, session: &SessionId, window: Option<usize>) -> MemoryResult<Vec<Message>>;

    /// Persist anything buffered. A no-op for transient stores.
    async fn flush(&self) -> MemoryResult<()>;

    /// Sessions known to the store.
    async fn sessions(&self) -> MemoryResult<Vec<SessionId>>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

/// Last `window` messages of `log` (all of them for `None`).
pub(crate) fn tail(log: &[Message], window: Option<usize>) -> Vec<Message> {
    let start = match window {
        Some(k) => log.len().saturating_sub(k),
        None => 0,
    };
    log[start..].to_vec()
}

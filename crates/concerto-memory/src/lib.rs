//! # Concerto Memory
//!
//! Session memory backends for the Concerto runtime. A session log is an
//! ordered, append-only list of [`Message`](concerto_core::Message)s keyed by
//! [`SessionId`](concerto_core::SessionId).
//!
//! ## Backends
//!
//! - **[InMemoryStore]**: transient, map-backed storage
//! - **[FileStore]**: one JSON Lines file per session, flushed explicitly
//!
//! ## Example
//!
//! ```rust
//! use concerto_core::{Message, SessionId};
//! use concerto_memory::{InMemoryStore, MemoryStore};
//!
//! # tokio_test::block_on(async {
//! let memory = InMemoryStore::new();
//! let session = SessionId::parse("demo").unwrap();
//! memory.append(&session, Message::user("hi")).await.unwrap();
//! memory.append(&session, Message::assistant("hello")).await.unwrap();
//!
//! let last = memory.read(&session, Some(1)).await.unwrap();
//! assert_eq!(last[0].content(), "hello");
//! # });
//! ```

mod file_store;
mod in_memory;
mod store;

pub use file_store::FileStore;
pub use in_memory::InMemoryStore;
pub use store::MemoryStore;

pub use concerto_core::error::{MemoryError, MemoryOperation, MemoryResult};

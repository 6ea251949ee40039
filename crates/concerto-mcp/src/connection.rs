//! The capability-server contract.
//!
//! Only the call contract is defined here; transports (stdio child
//! processes, sockets) implement [`ServerConnector`] outside this crate.

use async_trait::async_trait;
use concerto_core::tool::{ToolOutput, ToolSpec};
use serde_json::Value;
use std::sync::Arc;

use crate::error::CapabilityResult;

/// Knows how to open a connection to one capability server.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    /// Server name used in logs and in remote tool entries.
    fn name(&self) -> &str;

    /// Open a new connection.
    async fn connect(&self) -> CapabilityResult<Arc<dyn CapabilityConnection>>;
}

/// A live connection to a capability server.
///
/// Connections are shared by every branch of a run, so calls may be
/// concurrent.
#[async_trait]
pub trait CapabilityConnection: Send + Sync {
    /// Tools the server provides.
    async fn list_tools(&self) -> CapabilityResult<Vec<ToolSpec>>;

    /// Invoke a tool with a JSON arguments object.
    async fn call_tool(&self, name: &str, arguments: Value) -> CapabilityResult<ToolOutput>;

    /// Release the connection. Called at most once by the gateway.
    async fn close(&self) -> CapabilityResult<()>;
}

//! In-process capability server.

use async_trait::async_trait;
use concerto_core::identifiers::ToolName;
use concerto_core::tool::{ToolOutput, ToolSpec};
use concerto_tools::LocalTool;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::connection::{CapabilityConnection, ServerConnector};
use crate::error::{CapabilityError, CapabilityResult};

/// Exposes a set of local tools through the capability-server contract.
///
/// Useful for embedding a tool collection behind the same boundary as a
/// remote server, and for tests.
///
/// ```rust
/// use concerto_mcp::{LocalCapabilityServer, ServerConnector};
/// use concerto_tools::EchoTool;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let server = LocalCapabilityServer::new("utilities").with_tool(Arc::new(EchoTool::new()));
/// let connection = server.connect().await.unwrap();
/// let tools = connection.list_tools().await.unwrap();
/// assert_eq!(tools[0].name.as_str(), "echo");
/// # });
/// ```
#[derive(Clone)]
pub struct LocalCapabilityServer {
    name: String,
    tools: Vec<Arc<dyn LocalTool>>,
}

impl LocalCapabilityServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn LocalTool>>) -> Self {
        self.tools.extend(tools);
        self
    }
}

#[async_trait]
impl ServerConnector for LocalCapabilityServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> CapabilityResult<Arc<dyn CapabilityConnection>> {
        let mut tools = HashMap::new();
        let mut specs = Vec::with_capacity(self.tools.len());
        for tool in &self.tools {
            let name = ToolName::parse(tool.name()).map_err(|e| CapabilityError::Connect {
                server: self.name.clone(),
                message: e.to_string(),
            })?;
            specs.push(ToolSpec::new(name.clone(), tool.description()).with_parameters(tool.parameters()));
            tools.insert(name, Arc::clone(tool));
        }
        debug!(server = %self.name, tools = specs.len(), "Local capability server connected");
        Ok(Arc::new(LocalConnection {
            server: self.name.clone(),
            specs,
            tools,
            closed: AtomicBool::new(false),
        }))
    }
}

struct LocalConnection {
    server: String,
    specs: Vec<ToolSpec>,
    tools: HashMap<ToolName, Arc<dyn LocalTool>>,
    closed: AtomicBool,
}

impl LocalConnection {
    fn ensure_open(&self) -> CapabilityResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CapabilityError::ConnectionClosed {
                server: self.server.clone(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CapabilityConnection for LocalConnection {
    async fn list_tools(&self) -> CapabilityResult<Vec<ToolSpec>> {
        self.ensure_open()?;
        Ok(self.specs.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> CapabilityResult<ToolOutput> {
        self.ensure_open()?;
        let tool = self.tools.get(name).ok_or_else(|| CapabilityError::ToolNotFound {
            server: self.server.clone(),
            tool: name.to_string(),
        })?;
        tool.call(arguments)
            .await
            .map_err(|e| CapabilityError::ToolFailed {
                server: self.server.clone(),
                tool: name.to_string(),
                message: e.to_string(),
            })
    }

    async fn close(&self) -> CapabilityResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CapabilityError::ConnectionClosed {
                server: self.server.clone(),
            });
        }
        Ok(())
    }
}

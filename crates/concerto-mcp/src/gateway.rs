//! Connection lifecycle for every capability server a run uses.

use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use concerto_core::tool::ToolOutput;
use concerto_tools::RemoteTool;

use crate::connection::{CapabilityConnection, ServerConnector};
use crate::error::{CapabilityError, CapabilityResult};

struct ConnectedServer {
    name: String,
    connection: Arc<dyn CapabilityConnection>,
    tools: Vec<RemoteTool>,
}

/// Open connections to the registered capability servers.
///
/// A gateway is created when a runtime context starts and closed when it
/// ends. [`CapabilityGateway::close`] disconnects every server exactly once,
/// no matter how many times it is called.
pub struct CapabilityGateway {
    servers: Vec<ConnectedServer>,
    closed: AtomicBool,
}

impl CapabilityGateway {
    /// A gateway with no servers.
    pub fn empty() -> Self {
        Self {
            servers: Vec::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Connect every server and list its tools.
    ///
    /// If any server fails, the servers already connected are closed again
    /// and the first error is returned.
    pub async fn connect(connectors: &[Arc<dyn ServerConnector>]) -> CapabilityResult<Self> {
        let mut gateway = Self::empty();
        for connector in connectors {
            match Self::connect_one(connector.as_ref()).await {
                Ok(server) => gateway.servers.push(server),
                Err(e) => {
                    warn!(server = %connector.name(), error = %e, "Capability server unavailable");
                    if let Err(close_err) = gateway.close().await {
                        warn!(error = %close_err, "Failed to release partially opened gateway");
                    }
                    return Err(e);
                }
            }
        }
        info!(
            servers = gateway.servers.len(),
            tools = gateway.servers.iter().map(|s| s.tools.len()).sum::<usize>(),
            "Capability gateway connected"
        );
        Ok(gateway)
    }

    async fn connect_one(connector: &dyn ServerConnector) -> CapabilityResult<ConnectedServer> {
        let name = connector.name().to_string();
        let connection = connector.connect().await?;
        let specs = match connection.list_tools().await {
            Ok(specs) => specs,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    warn!(server = %name, error = %close_err, "Failed to close connection after discovery error");
                }
                return Err(e);
            }
        };
        debug!(server = %name, tools = specs.len(), "Discovered remote tools");
        let tools = specs
            .into_iter()
            .map(|spec| RemoteTool {
                server: name.clone(),
                spec,
            })
            .collect();
        Ok(ConnectedServer {
            name,
            connection,
            tools,
        })
    }

    /// Remote tools in server registration order.
    pub fn tools(&self) -> impl Iterator<Item = &RemoteTool> {
        self.servers.iter().flat_map(|server| server.tools.iter())
    }

    /// Names of the connected servers.
    pub fn servers(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Call a tool on the named server.
    pub async fn call(&self, server: &str, tool: &str, arguments: Value) -> CapabilityResult<ToolOutput> {
        if self.is_closed() {
            return Err(CapabilityError::ConnectionClosed {
                server: server.to_string(),
            });
        }
        let connected = self
            .servers
            .iter()
            .find(|s| s.name == server)
            .ok_or_else(|| CapabilityError::ToolNotFound {
                server: server.to_string(),
                tool: tool.to_string(),
            })?;
        debug!(server = %server, tool = %tool, "Calling remote tool");
        connected.connection.call_tool(tool, arguments).await
    }

    /// Disconnect every server. Only the first call does any work.
    ///
    /// All servers are closed even if some fail; the first failure is
    /// returned.
    pub async fn close(&self) -> CapabilityResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_error = None;
        for server in &self.servers {
            match server.connection.close().await {
                Ok(()) => debug!(server = %server.name, "Disconnected capability server"),
                Err(e) => {
                    warn!(server = %server.name, error = %e, "Failed to disconnect capability server");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for CapabilityGateway {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for CapabilityGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityGateway")
            .field("servers", &self.servers())
            .field("closed", &self.is_closed())
            .finish()
    }
}

//! # Mock Capability Server
//!
//! A [`ServerConnector`] backed by [`LocalCapabilityServer`] that counts
//! connects, calls and closes, and can be told to refuse connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use concerto_core::tool::{ToolOutput, ToolSpec};
use concerto_mcp::{
    CapabilityConnection, CapabilityError, CapabilityResult, LocalCapabilityServer, ServerConnector,
};
use concerto_tools::LocalTool;
use serde_json::Value;

/// Lifecycle counters shared between a mock server and its connections.
#[derive(Debug, Default)]
pub struct ServerStats {
    connects: AtomicUsize,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl ServerStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockCapabilityServer {
    inner: LocalCapabilityServer,
    name: String,
    stats: Arc<ServerStats>,
    fail_connect: Option<String>,
}

impl MockCapabilityServer {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: LocalCapabilityServer::new(name.clone()),
            name,
            stats: Arc::new(ServerStats::default()),
            fail_connect: None,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.inner = self.inner.with_tool(tool);
        self
    }

    /// Refuse every connection attempt with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_connect = Some(message.into());
        self
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl ServerConnector for MockCapabilityServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> CapabilityResult<Arc<dyn CapabilityConnection>> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_connect {
            return Err(CapabilityError::Connect {
                server: self.name.clone(),
                message: message.clone(),
            });
        }
        let inner = self.inner.connect().await?;
        Ok(Arc::new(CountingConnection {
            inner,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct CountingConnection {
    inner: Arc<dyn CapabilityConnection>,
    stats: Arc<ServerStats>,
}

#[async_trait]
impl CapabilityConnection for CountingConnection {
    async fn list_tools(&self) -> CapabilityResult<Vec<ToolSpec>> {
        self.inner.list_tools().await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> CapabilityResult<ToolOutput> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.call_tool(name, arguments).await
    }

    async fn close(&self) -> CapabilityResult<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

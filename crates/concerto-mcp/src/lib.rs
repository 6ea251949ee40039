//! # Concerto MCP - Capability Server Boundary
//!
//! Remote tools come from capability servers speaking a list/call protocol.
//! This crate defines that boundary and manages connection lifecycles:
//!
//! - [`ServerConnector`] / [`CapabilityConnection`]: the call contract a
//!   transport implements
//! - [`CapabilityGateway`]: connects every registered server when a run
//!   starts and disconnects them exactly once when it ends
//! - [`LocalCapabilityServer`]: serves local tools through the same contract,
//!   in-process
//!
//! The wire protocol itself is left to transport implementations.
//!
//! ## Example
//!
//! ```rust
//! use concerto_mcp::{CapabilityGateway, LocalCapabilityServer, ServerConnector};
//! use concerto_tools::AddTool;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let math: Arc<dyn ServerConnector> =
//!     Arc::new(LocalCapabilityServer::new("math").with_tool(Arc::new(AddTool::new())));
//!
//! let gateway = CapabilityGateway::connect(&[math]).await.unwrap();
//! let sum = gateway.call("math", "add", json!({"a": 5, "b": 7})).await.unwrap();
//! assert_eq!(sum.to_text(), "12");
//!
//! gateway.close().await.unwrap();
//! # });
//! ```

pub mod connection;
pub mod error;
pub mod gateway;
pub mod local_server;

pub use connection::{CapabilityConnection, ServerConnector};
pub use error::{CapabilityError, CapabilityResult};
pub use gateway::CapabilityGateway;
pub use local_server::LocalCapabilityServer;

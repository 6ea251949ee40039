//! Error types shared across the workspace.
//!
//! The error types are organized into focused submodules:
//! - `config`: application setup and configuration document errors
//! - `tool`: local tool invocation errors
//! - `memory`: session log storage errors
//!
//! Runtime orchestration errors (`FlowError`) live in `concerto-agent`, which
//! wraps these.

mod config;
mod memory;
mod tool;

pub use config::{ConfigError, ConfigResult};
pub use memory::{MemoryError, MemoryOperation, MemoryResult};
pub use tool::{ToolError, ToolResult};

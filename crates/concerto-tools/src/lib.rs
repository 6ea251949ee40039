//! # Concerto Tools
//!
//! Tool plumbing for the Concerto runtime:
//!
//! - [`LocalTool`]: the async trait for in-process tools, with
//!   [`FunctionTool`] for closures
//! - [`standard`]: the shipped `echo`, `add` and `text_transform` tools
//! - [`ToolTable`]: the per-context mapping from tool name to local tool,
//!   remote capability-server tool, or agent

pub mod local;
pub mod standard;
pub mod table;

pub use local::{FunctionTool, LocalTool, ToolArgs};
pub use standard::{AddTool, EchoTool, TextOperation, TextTransformTool};
pub use table::{RemoteTool, ToolEntry, ToolKind, ToolTable, ToolTableBuilder};

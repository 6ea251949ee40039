//! # Concerto Core
//!
//! Shared data model for the Concerto orchestration runtime: validated
//! identifiers, conversation messages, tool declarations, agent declarations
//! and the pattern tree that flows are built from.
//!
//! Nothing in this crate performs I/O. Execution lives in `concerto-agent`.

pub mod agent;
pub mod collections;
pub mod error;
pub mod identifiers;
pub mod message;
pub mod pattern;
pub mod tool;

pub use agent::AgentSpec;
pub use collections::NonEmptyVec;
pub use error::{ConfigError, ConfigResult, MemoryError, MemoryResult, ToolError};
pub use identifiers::{AgentName, FlowName, NameError, SessionId, ToolName};
pub use message::{Message, Role, ToolCall};
pub use pattern::{Flow, ParallelTask, Pattern, PatternKind, Step, StepRef, Termination};
pub use tool::{FailureReason, ToolOutput, ToolResult, ToolSpec};

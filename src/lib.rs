//! # Concerto
//!
//! Concerto is a Rust-native runtime for orchestrating multi-agent LLM
//! workloads. Agents are declared once, bound to a model and a set of tools,
//! and composed into flows built from four patterns: sequential, parallel,
//! router and discussion.
//!
//! ## Core Components
//!
//! - **[AgentSpec]**: declarative agent description (prompt template, tools, callable agents)
//! - **[Pattern]**, **[Flow]**: composition of agents, flows and inline patterns
//! - **[Application]**: validated registry of agents, flows, tools and capability servers
//! - **[RuntimeContext]**: one live session with connected servers and shared memory
//! - **[ModelBinding]**: the seam to an LLM provider
//! - **[MemoryStore]**: per-session message history, in memory or as JSONL files
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use concerto::{AgentSpec, Application, Flow, Pattern, RuntimeContext, SessionId, StepRef};
//! use concerto::{AgentName, FlowName, NonEmptyVec};
//! use concerto_testing::ScriptedModel;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let model = ScriptedModel::new()
//!     .call_tool("Adder", "add", json!({"text": "5,7"}))
//!     .reply("Adder", "12")
//!     .echo_fallback();
//!
//! let pipeline = Flow::new(
//!     FlowName::parse("pipeline").unwrap(),
//!     Pattern::sequential(NonEmptyVec::new(
//!         StepRef::agent(AgentName::parse("Adder").unwrap()),
//!         vec![StepRef::agent(AgentName::parse("Greeter").unwrap())],
//!     )),
//! );
//!
//! let app = Application::builder(Arc::new(model))
//!     .agent(AgentSpec::new(AgentName::parse("Adder").unwrap()).with_tool("add".parse().unwrap()))
//!     .agent(AgentSpec::new(AgentName::parse("Greeter").unwrap()))
//!     .tools(concerto::tools::standard::all())
//!     .flow(pipeline)
//!     .build()
//!     .unwrap();
//!
//! let answer = RuntimeContext::scope(app, SessionId::generate(), |ctx| async move {
//!     ctx.run_flow("pipeline", "5,7").await
//! })
//! .await
//! .unwrap();
//! assert_eq!(answer.content(), "Greeter: 12");
//! # });
//! ```
//!
//! ## Architecture
//!
//! The workspace is split by concern: `concerto-core` holds the shared
//! types, `concerto-memory` the session stores, `concerto-tools` the local
//! tools and the per-context tool table, `concerto-mcp` the capability
//! server lifecycle, and `concerto-agent` the executor, the pattern engine
//! and the runtime context. This crate re-exports all of them.

// ============================================================================
// Module aliases for namespaced access
// ============================================================================

pub use concerto_agent as agent;
pub use concerto_core as core;
pub use concerto_mcp as mcp;
pub use concerto_memory as memory;
pub use concerto_tools as tools;

#[cfg(feature = "testing")]
pub use concerto_testing as testing;

// ============================================================================
// Core types - Identifiers, messages, errors
// ============================================================================

pub use concerto_core::{AgentName, FlowName, NameError, SessionId, ToolName};

pub use concerto_core::{Message, Role, ToolCall};

pub use concerto_core::{ConfigError, ConfigResult, MemoryError, MemoryResult, ToolError};

pub use concerto_core::NonEmptyVec;

// ============================================================================
// Agents and patterns
// ============================================================================

pub use concerto_core::AgentSpec;

pub use concerto_core::{Flow, ParallelTask, Pattern, PatternKind, Step, StepRef, Termination};

// ============================================================================
// Tools
// ============================================================================

pub use concerto_core::{FailureReason, ToolOutput, ToolResult, ToolSpec};

pub use concerto_tools::{FunctionTool, LocalTool, ToolArgs, ToolKind, ToolTable};

// Standard tools
pub use concerto_tools::{AddTool, EchoTool, TextOperation, TextTransformTool};

// ============================================================================
// Capability servers
// ============================================================================

pub use concerto_mcp::{
    CapabilityConnection, CapabilityError, CapabilityGateway, CapabilityResult,
    LocalCapabilityServer, ServerConnector,
};

// ============================================================================
// Memory backends
// ============================================================================

pub use concerto_memory::{FileStore, InMemoryStore, MemoryStore};

// ============================================================================
// Runtime
// ============================================================================

pub use concerto_agent::{Application, ApplicationBuilder, DefaultTarget, RuntimeSettings};

pub use concerto_agent::{ChatSummary, ConfigDocument, RuntimeContext};

pub use concerto_agent::{FlowError, FlowResult};

pub use concerto_agent::{
    ModelBinding, ModelError, ModelEvent, ModelRequest, ModelResponse, ModelStream,
};

pub use concerto_agent::{AgentEvent, AgentStream, TaskOutcome, TaskResults};

//! Error types for flow execution.

use concerto_core::error::{ConfigError, MemoryError};
use concerto_core::pattern::PatternKind;
use concerto_mcp::CapabilityError;
use thiserror::Error;

use crate::model::ModelError;

/// Errors that can occur while running agents and flows.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Application setup rejected the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No agent registered under this name
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// No flow registered under this name
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    /// The model binding kept failing for an agent
    #[error("Model call for agent '{agent}' failed after {attempts} attempt(s): {source}")]
    ModelCall {
        agent: String,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    /// Agent-as-tool calls nested deeper than the configured limit
    #[error("Agent call depth limit {limit} exceeded: {}", chain.join(" -> "))]
    RecursionLimit { chain: Vec<String>, limit: usize },

    /// A step of a pattern failed
    #[error("{pattern} step '{step}' failed: {source}")]
    Step {
        pattern: PatternKind,
        step: String,
        #[source]
        source: Box<FlowError>,
    },

    /// Every branch of a parallel fan-out failed
    #[error("All {} tasks of {pattern} failed", failures.len())]
    AllTasksFailed {
        pattern: PatternKind,
        /// `(task, error)` pairs in task order
        failures: Vec<(String, String)>,
    },

    /// The run was cancelled or the context was closed
    #[error("Execution cancelled")]
    Cancelled,

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// A capability server failed while the context started or closed
    #[error("Capability server error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Wrap a failure of one step of a pattern.
    ///
    /// Cancellation is passed through unwrapped so callers can match on it
    /// directly, whatever depth it surfaced at.
    pub fn step(pattern: PatternKind, step: impl Into<String>, source: FlowError) -> Self {
        match source {
            FlowError::Cancelled => FlowError::Cancelled,
            source => FlowError::Step {
                pattern,
                step: step.into(),
                source: Box::new(source),
            },
        }
    }

    /// The innermost error beneath any [`FlowError::Step`] wrappers.
    pub fn root_cause(&self) -> &FlowError {
        match self {
            FlowError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Step labels from the outermost pattern down to the failing step.
    pub fn step_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self;
        while let FlowError::Step { step, source, .. } = current {
            path.push(step.as_str());
            current = source;
        }
        path
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::ModelCall { source, .. } => source.is_retryable(),
            FlowError::Step { source, .. } => source.is_retryable(),
            FlowError::Memory(e) => e.is_retryable(),
            FlowError::Capability(e) => e.is_retryable(),
            FlowError::Io(_) => true,
            _ => false,
        }
    }

    /// Get error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            FlowError::Config(e) => e.error_code(),
            FlowError::AgentNotFound(_) => "AGENT_NOT_FOUND",
            FlowError::FlowNotFound(_) => "FLOW_NOT_FOUND",
            FlowError::ModelCall { .. } => "MODEL_CALL_FAILED",
            FlowError::RecursionLimit { .. } => "RECURSION_LIMIT",
            FlowError::Step { source, .. } => source.error_code(),
            FlowError::AllTasksFailed { .. } => "ALL_TASKS_FAILED",
            FlowError::Cancelled => "CANCELLED",
            FlowError::Memory(_) => "MEMORY_ERROR",
            FlowError::Capability(e) => e.error_code(),
            FlowError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

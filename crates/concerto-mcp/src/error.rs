//! Capability-server error types.

use concerto_core::tool::FailureReason;
use thiserror::Error;

/// Capability operation result type
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Errors raised at the capability-server boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Could not establish a connection
    #[error("Failed to connect to capability server '{server}': {message}")]
    Connect { server: String, message: String },

    /// Listing tools failed
    #[error("Capability server '{server}' failed to list tools: {message}")]
    Discovery { server: String, message: String },

    /// The server does not provide the tool
    #[error("Tool '{tool}' not found on capability server '{server}'")]
    ToolNotFound { server: String, tool: String },

    /// The server ran the tool and it failed
    #[error("Tool '{tool}' failed on capability server '{server}': {message}")]
    ToolFailed {
        server: String,
        tool: String,
        message: String,
    },

    /// The connection was already closed
    #[error("Connection to capability server '{server}' is closed")]
    ConnectionClosed { server: String },

    /// Closing the connection failed
    #[error("Failed to disconnect from capability server '{server}': {message}")]
    Disconnect { server: String, message: String },
}

impl CapabilityError {
    pub fn server(&self) -> &str {
        match self {
            CapabilityError::Connect { server, .. }
            | CapabilityError::Discovery { server, .. }
            | CapabilityError::ToolNotFound { server, .. }
            | CapabilityError::ToolFailed { server, .. }
            | CapabilityError::ConnectionClosed { server }
            | CapabilityError::Disconnect { server, .. } => server,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CapabilityError::Connect { .. } => "CAPABILITY_CONNECT",
            CapabilityError::Discovery { .. } => "CAPABILITY_DISCOVERY",
            CapabilityError::ToolNotFound { .. } => "CAPABILITY_TOOL_NOT_FOUND",
            CapabilityError::ToolFailed { .. } => "CAPABILITY_TOOL_FAILED",
            CapabilityError::ConnectionClosed { .. } => "CAPABILITY_CONNECTION_CLOSED",
            CapabilityError::Disconnect { .. } => "CAPABILITY_DISCONNECT",
        }
    }

    /// Connection-level failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CapabilityError::Connect { .. } | CapabilityError::Discovery { .. }
        )
    }

    /// Convert to the failure reported back to the calling agent.
    pub fn to_failure_reason(&self) -> FailureReason {
        match self {
            CapabilityError::ToolNotFound { tool, .. } => FailureReason::NotFound { tool: tool.clone() },
            other => FailureReason::RemoteError {
                server: other.server().to_string(),
                message: other.to_string(),
            },
        }
    }
}

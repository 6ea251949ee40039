//! Local tool invocation errors.

use crate::tool::FailureReason;
use thiserror::Error;

/// Errors a local tool implementation may return.
///
/// Tool errors never abort an agent: the executor converts them into a
/// [`FailureReason`] and then into a tool-result message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Arguments were missing or had the wrong shape.
    #[error("Tool '{tool}' received invalid input: {reason}")]
    InvalidInput { tool: String, reason: String },

    /// The tool ran and failed.
    #[error("Tool '{tool}' execution failed: {message}")]
    ExecutionFailed { tool: String, message: String },

    /// The tool did not finish in time.
    #[error("Tool '{tool}' timed out after {duration_ms}ms")]
    Timeout { tool: String, duration_ms: u64 },
}

impl ToolError {
    pub fn invalid_input(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidInput {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn execution_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::ExecutionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Name of the tool that failed.
    pub fn tool_name(&self) -> &str {
        match self {
            ToolError::InvalidInput { tool, .. }
            | ToolError::ExecutionFailed { tool, .. }
            | ToolError::Timeout { tool, .. } => tool,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}

impl From<ToolError> for FailureReason {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidInput { reason, .. } => FailureReason::InvalidInput { message: reason },
            ToolError::ExecutionFailed { message, .. } => FailureReason::ExecutionFailed { message },
            ToolError::Timeout { tool, duration_ms } => FailureReason::Timeout { tool, duration_ms },
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

//! Session log storage errors.

use std::fmt;
use thiserror::Error;

/// Memory operation being performed when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation {
    Append,
    Read,
    Load,
    Flush,
    List,
}

impl fmt::Display for MemoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryOperation::Append => "append",
            MemoryOperation::Read => "read",
            MemoryOperation::Load => "load",
            MemoryOperation::Flush => "flush",
            MemoryOperation::List => "list",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The backing storage failed.
    #[error("memory {operation} failed for '{target}': {message}")]
    Storage {
        operation: MemoryOperation,
        target: String,
        message: String,
    },

    /// A persisted entry could not be decoded.
    #[error("corrupt entry in session '{session}' at line {line}: {message}")]
    Corrupt {
        session: String,
        line: usize,
        message: String,
    },

    /// A message could not be encoded.
    #[error("failed to serialize message for session '{session}': {message}")]
    Serialization { session: String, message: String },
}

impl MemoryError {
    pub fn storage(
        operation: MemoryOperation,
        target: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        MemoryError::Storage {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Storage failures may be transient; decoding failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::Storage { .. })
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;

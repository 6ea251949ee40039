use concerto_agent::FlowError;
use concerto_core::error::{ConfigError, MemoryError};
use concerto_core::identifiers::NameError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Invalid session id: {0}")]
    Session(#[from] NameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Config(e) => e.error_code(),
            CliError::Flow(e) => e.error_code(),
            CliError::Memory(_) => "MEMORY_ERROR",
            CliError::Session(_) => "INVALID_SESSION",
            CliError::Io(_) => "IO_ERROR",
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

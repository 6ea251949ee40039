//! Setup-time errors.
//!
//! Everything here is detected while building an application or loading a
//! configuration document, never during a run.

use crate::identifiers::NameError;
use thiserror::Error;

/// Errors raised while validating an application or configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The same name is registered twice (agents, flows and local tools share
    /// one namespace).
    #[error("duplicate name '{name}': already registered as {existing}")]
    DuplicateName { name: String, existing: String },

    /// A reference points at an agent that is not registered.
    #[error("{referenced_by} references unknown agent '{name}'")]
    UnknownAgent { referenced_by: String, name: String },

    /// A reference points at a flow that is not registered.
    #[error("{referenced_by} references unknown flow '{name}'")]
    UnknownFlow { referenced_by: String, name: String },

    /// An agent is bound to a tool that no local tool or capability server provides.
    #[error("agent '{agent}' is bound to unknown tool '{name}'")]
    UnknownTool { agent: String, name: String },

    /// Flows reference each other in a cycle.
    #[error("flow reference cycle: {}", cycle.join(" -> "))]
    FlowCycle { cycle: Vec<String> },

    /// A name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// A pattern is structurally invalid.
    #[error("invalid {pattern} pattern in {location}: {reason}")]
    InvalidPattern {
        pattern: String,
        location: String,
        reason: String,
    },

    /// A runtime setting is out of range.
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: String, reason: String },

    /// No default target is configured for interactive use.
    #[error("no default agent or flow configured")]
    NoDefaultTarget,

    /// The document could not be parsed.
    #[error("failed to parse configuration: {message}")]
    Parse { message: String },

    /// The document could not be read.
    #[error("failed to read configuration '{path}': {message}")]
    Read { path: String, message: String },
}

impl ConfigError {
    pub fn invalid_pattern(
        pattern: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidPattern {
            pattern: pattern.into(),
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_setting(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSetting {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::DuplicateName { .. } => "CONFIG_DUPLICATE_NAME",
            ConfigError::UnknownAgent { .. } => "CONFIG_UNKNOWN_AGENT",
            ConfigError::UnknownFlow { .. } => "CONFIG_UNKNOWN_FLOW",
            ConfigError::UnknownTool { .. } => "CONFIG_UNKNOWN_TOOL",
            ConfigError::FlowCycle { .. } => "CONFIG_FLOW_CYCLE",
            ConfigError::InvalidName(_) => "CONFIG_INVALID_NAME",
            ConfigError::InvalidPattern { .. } => "CONFIG_INVALID_PATTERN",
            ConfigError::InvalidSetting { .. } => "CONFIG_INVALID_SETTING",
            ConfigError::NoDefaultTarget => "CONFIG_NO_DEFAULT_TARGET",
            ConfigError::Parse { .. } => "CONFIG_PARSE",
            ConfigError::Read { .. } => "CONFIG_READ",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

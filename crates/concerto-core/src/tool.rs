//! Tool declarations and invocation outcomes.
//!
//! A tool is declared by a [`ToolSpec`] (`name`, `description`, JSON-schema
//! `parameters`) no matter where it runs: a local function, a remote
//! capability server, or another agent. Invocation yields a [`ToolOutput`] or
//! a [`FailureReason`]; either way the outcome ends up as a tool-role
//! [`Message`] so the calling agent can react to it.

use crate::identifiers::ToolName;
use crate::message::{Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Declaration of an invocable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: ToolName,
    #[serde(default)]
    pub description: String,
    /// JSON schema describing the arguments object
    #[serde(default = "ToolSpec::empty_parameters")]
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn new(name: ToolName, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            parameters: Self::empty_parameters(),
        }
    }

    /// Set the JSON schema for the arguments.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Schema accepting an arbitrary object.
    pub fn empty_parameters() -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// One-line description used when rendering the tool list into a prompt.
    pub fn prompt_line(&self) -> String {
        format!(
            "- {}: {} (parameters: {})",
            self.name, self.description, self.parameters
        )
    }
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Json(serde_json::Value),
}

impl ToolOutput {
    /// Text form of the output as it is shown to the model.
    pub fn to_text(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Json(serde_json::Value::String(s)) => s.clone(),
            ToolOutput::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<serde_json::Value> for ToolOutput {
    fn from(value: serde_json::Value) -> Self {
        ToolOutput::Json(value)
    }
}

/// Categorized failure reasons for tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// Arguments did not match what the tool expects
    InvalidInput { message: String },
    /// No tool with that name is available to the caller
    NotFound { tool: String },
    /// The tool exceeded its time budget
    Timeout { tool: String, duration_ms: u64 },
    /// Remote capability server could not be reached or answered badly
    RemoteError { server: String, message: String },
    /// Agent-as-tool invocation failed
    AgentFailed { agent: String, message: String },
    /// Anything else the tool reported
    ExecutionFailed { message: String },
}

impl FailureReason {
    /// Get a human-readable error message
    pub fn message(&self) -> String {
        match self {
            FailureReason::InvalidInput { message } => format!("Invalid input: {}", message),
            FailureReason::NotFound { tool } => format!("Tool '{}' is not available", tool),
            FailureReason::Timeout { tool, duration_ms } => {
                format!("Tool '{}' timed out after {}ms", tool, duration_ms)
            }
            FailureReason::RemoteError { server, message } => {
                format!("Capability server '{}' error: {}", server, message)
            }
            FailureReason::AgentFailed { agent, message } => {
                format!("Agent '{}' failed: {}", agent, message)
            }
            FailureReason::ExecutionFailed { message } => format!("Execution failed: {}", message),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Outcome of one tool call, before it is materialized as a message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: ToolName,
    pub outcome: Result<ToolOutput, FailureReason>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: ToolOutput) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            outcome: Ok(output),
        }
    }

    pub fn failure(call: &ToolCall, reason: FailureReason) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            outcome: Err(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Convert into the tool-role message appended to history.
    ///
    /// Failures are rendered as `Error: ...` and flagged with `is_error`
    /// metadata so the model sees the text and callers can detect it.
    pub fn into_message(self) -> Message {
        match self.outcome {
            Ok(output) => Message::tool_result(self.call_id, output.to_text())
                .with_metadata("tool", serde_json::json!(self.name.as_str())),
            Err(reason) => Message::tool_result(self.call_id, format!("Error: {}", reason))
                .with_metadata("tool", serde_json::json!(self.name.as_str()))
                .with_metadata("is_error", serde_json::json!(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use serde_json::json;

    fn call() -> ToolCall {
        ToolCall::with_id("call_7", ToolName::new_unchecked("echo"), json!({"text": "hi"}))
    }

    #[test]
    fn test_output_text_rendering() {
        assert_eq!(ToolOutput::from("plain").to_text(), "plain");
        assert_eq!(ToolOutput::from(json!("quoted")).to_text(), "quoted");
        assert_eq!(ToolOutput::from(json!({"sum": 12})).to_text(), r#"{"sum":12}"#);
    }

    #[test]
    fn test_success_message() {
        let msg = ToolResult::success(&call(), ToolOutput::from("hi")).into_message();
        assert_eq!(msg.role(), Role::Tool);
        assert_eq!(msg.tool_call_id(), Some("call_7"));
        assert_eq!(msg.content(), "hi");
        assert!(msg.metadata_value("is_error").is_none());
    }

    #[test]
    fn test_failure_message_is_flagged() {
        let reason = FailureReason::NotFound {
            tool: "echo".to_string(),
        };
        let msg = ToolResult::failure(&call(), reason).into_message();
        assert_eq!(msg.content(), "Error: Tool 'echo' is not available");
        assert_eq!(msg.metadata_value("is_error"), Some(&json!(true)));
    }

    #[test]
    fn test_prompt_line() {
        let spec = ToolSpec::new(ToolName::new_unchecked("echo"), "Echo text back");
        assert!(spec.prompt_line().starts_with("- echo: Echo text back"));
    }

    #[test]
    fn test_failure_reason_serde_tagging() {
        let reason = FailureReason::Timeout {
            tool: "slow".to_string(),
            duration_ms: 50,
        };
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["type"], "timeout");
    }
}

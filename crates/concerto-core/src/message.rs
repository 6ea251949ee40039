//! Conversation messages.
//!
//! A [`Message`] is immutable once built: fields are private and only the
//! consuming `with_*` builders can set the optional parts, so a message that
//! has been appended to a session log can be shared freely between branches.

use crate::identifiers::{AgentName, ToolName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions to the model
    System,
    /// Input from the caller (or from a previous step)
    User,
    /// Model output
    Assistant,
    /// Result of a tool call
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the request with its tool-result message
    pub id: String,
    /// Tool to invoke
    pub name: ToolName,
    /// Structured arguments (a JSON object by convention)
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a tool call with a fresh id.
    pub fn new(name: ToolName, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name,
            arguments,
        }
    }

    /// Create a tool call with an explicit id.
    pub fn with_id(id: impl Into<String>, name: ToolName, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name,
            arguments,
        }
    }
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<AgentName>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    metadata: serde_json::Map<String, serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message with the given role and text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            author: None,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// An assistant message requesting tool calls.
    pub fn tool_request(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// A tool-result message answering the call with `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(call_id.into());
        msg
    }

    /// Set the authoring agent.
    pub fn with_author(mut self, author: AgentName) -> Self {
        self.author = Some(author);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Copy of this message's text re-addressed as user input.
    ///
    /// Used when one step's output becomes the next step's input.
    pub fn as_input(&self) -> Message {
        Message::user(self.content.clone())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    pub fn author(&self) -> Option<&AgentName> {
        self.author.as_ref()
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    /// Look up a metadata entry.
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Consume the message and return its text.
    pub fn into_content(self) -> String {
        self.content
    }
}

/// Plain text becomes user input.
impl From<String> for Message {
    fn from(content: String) -> Self {
        Message::user(content)
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Message::user(content)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.author {
            Some(author) => write!(f, "[{} {}] {}", self.role, author, self.content),
            None => write!(f, "[{}] {}", self.role, self.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_set_roles() {
        assert_eq!(Message::user("hi").role(), Role::User);
        assert_eq!(Message::assistant("hi").role(), Role::Assistant);
        assert_eq!(Message::system("hi").role(), Role::System);

        let result = Message::tool_result("call_1", "42");
        assert_eq!(result.role(), Role::Tool);
        assert_eq!(result.tool_call_id(), Some("call_1"));
    }

    #[test]
    fn test_tool_request_carries_calls() {
        let call = ToolCall::new(ToolName::new_unchecked("add"), json!({"a": 1, "b": 2}));
        let msg = Message::tool_request("", vec![call.clone()]);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls()[0], call);
        assert!(call.id.starts_with("call_"));
    }

    #[test]
    fn test_as_input_drops_everything_but_text() {
        let msg = Message::assistant("12")
            .with_author(AgentName::new_unchecked("Adder"))
            .with_metadata("truncated", json!(true));
        let input = msg.as_input();
        assert_eq!(input.role(), Role::User);
        assert_eq!(input.content(), "12");
        assert!(input.author().is_none());
        assert!(input.metadata().is_empty());
    }

    #[test]
    fn test_plain_text_converts_to_user_message() {
        let from_str: Message = "hi".into();
        let from_string = Message::from(String::from("hi"));
        assert_eq!(from_str.role(), Role::User);
        assert_eq!(from_string.content(), "hi");
    }

    #[test]
    fn test_serde_round_trip_skips_empty_fields() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("author").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_display_includes_author() {
        let msg = Message::assistant("hi").with_author(AgentName::new_unchecked("Greeter"));
        assert_eq!(msg.to_string(), "[assistant Greeter] hi");
    }
}

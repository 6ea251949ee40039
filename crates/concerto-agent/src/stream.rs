//! Streaming agent runs.

use std::pin::Pin;

use concerto_core::identifiers::AgentName;
use concerto_core::message::{Message, ToolCall};
use futures::Stream;

use crate::error::FlowResult;

/// Incremental progress of a streaming agent run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Partial answer text from the model
    TextDelta { agent: AgentName, text: String },
    /// The model asked for a tool call
    ToolCallRequested { agent: AgentName, call: ToolCall },
    /// A tool call finished; `message` is the tool-result message
    ToolResult { agent: AgentName, message: Message },
    /// The run finished with this answer. Always the last event of a
    /// successful stream.
    Completed(Message),
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Completed(_))
    }
}

/// Events of one streaming run, ending in exactly one final item: either
/// [`AgentEvent::Completed`] or an error.
pub type AgentStream = Pin<Box<dyn Stream<Item = FlowResult<AgentEvent>> + Send>>;

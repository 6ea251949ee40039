//! The model-binding boundary.
//!
//! The runtime never talks to a language model directly. Every agent turn is
//! one [`ModelRequest`] handed to a [`ModelBinding`]; the binding answers with
//! text and, optionally, tool calls. Providers, tokenizers and wire formats
//! all live behind this trait.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use concerto_core::identifiers::AgentName;
use concerto_core::message::{Message, ToolCall};
use concerto_core::tool::ToolSpec;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything the model sees for one turn of an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub agent: AgentName,
    /// Rendered system prompt, including the textual tool list
    pub system_prompt: String,
    /// Session history window followed by this execution's transcript
    pub history: Vec<Message>,
    /// Structured declarations of the tools the agent may call
    pub tools: Vec<ToolSpec>,
    /// Output token hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    /// The newest message of the conversation, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }
}

/// A complete model answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Whether the answer is final (no tools requested).
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Incremental output of a streaming model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolCall),
    /// Always the last event; carries the assembled response
    Done(ModelResponse),
}

/// Stream returned by [`ModelBinding::generate_stream`].
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send>>;

/// Failures reported by a model binding.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model provider unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model request: {0}")]
    InvalidRequest(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model error: {0}")]
    Other(String),
}

impl ModelError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Timeout(_) | ModelError::Unavailable(_) | ModelError::RateLimited(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ModelError::Timeout(_) => "MODEL_TIMEOUT",
            ModelError::Unavailable(_) => "MODEL_UNAVAILABLE",
            ModelError::RateLimited(_) => "MODEL_RATE_LIMITED",
            ModelError::InvalidRequest(_) => "MODEL_INVALID_REQUEST",
            ModelError::InvalidResponse(_) => "MODEL_INVALID_RESPONSE",
            ModelError::Other(_) => "MODEL_ERROR",
        }
    }
}

/// Adapter between the runtime and a language model.
#[async_trait]
pub trait ModelBinding: Send + Sync {
    /// Produce a complete answer for one turn.
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Produce the answer incrementally.
    ///
    /// The stream must end with exactly one [`ModelEvent::Done`]. The default
    /// implementation calls [`ModelBinding::generate`] and replays the result
    /// as a single text delta followed by the tool calls.
    async fn generate_stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(async_stream::stream! {
            if !response.text.is_empty() {
                yield Ok(ModelEvent::TextDelta(response.text.clone()));
            }
            for call in &response.tool_calls {
                yield Ok(ModelEvent::ToolCall(call.clone()));
            }
            yield Ok(ModelEvent::Done(response));
        }))
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concerto_core::identifiers::ToolName;
    use futures::StreamExt;
    use serde_json::json;

    struct Fixed(ModelResponse);

    #[async_trait]
    impl ModelBinding for Fixed {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
            Ok(self.0.clone())
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            agent: AgentName::new_unchecked("A"),
            system_prompt: String::new(),
            history: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_default_stream_replays_generate() {
        let call = ToolCall::with_id("c1", ToolName::new_unchecked("echo"), json!({}));
        let response = ModelResponse::text("hello").with_tool_call(call.clone());
        let model = Fixed(response.clone());

        let events: Vec<ModelEvent> = model
            .generate_stream(request())
            .await
            .unwrap()
            .map(|event| event.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                ModelEvent::TextDelta("hello".into()),
                ModelEvent::ToolCall(call),
                ModelEvent::Done(response),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_text_has_no_delta() {
        let model = Fixed(ModelResponse::default());
        let events: Vec<_> = model.generate_stream(request()).await.unwrap().collect().await;
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ModelError::RateLimited("slow down".into()).is_retryable());
        assert!(ModelError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(!ModelError::InvalidResponse("garbled".into()).is_retryable());
        assert_eq!(ModelError::Other("x".into()).error_code(), "MODEL_ERROR");
    }
}

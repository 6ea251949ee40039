//! # Mock Tools for Testing
//!
//! This module provides mock tool implementations that return predictable responses,
//! allowing for reliable and controlled agent testing scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use concerto_core::error::{ToolError, ToolResult};
use concerto_core::tool::ToolOutput;
use concerto_tools::LocalTool;
use serde_json::Value;

#[derive(Debug, Clone)]
enum MockResponse {
    Success(String),
    Failure(String),
}

/// A mock tool that returns predefined responses keyed by the rendered
/// arguments.
#[derive(Debug, Clone)]
pub struct MockTool {
    name: String,
    description: String,
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
    delay: Option<Duration>,
    call_count: Arc<AtomicUsize>,
    call_history: Arc<Mutex<Vec<Value>>>,
}

impl MockTool {
    /// Create a new mock tool with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: format!("Mock tool {}", name),
            name,
            responses: HashMap::new(),
            default_response: None,
            delay: None,
            call_count: Arc::new(AtomicUsize::new(0)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response for arguments whose text form (see [`ToolOutput::to_text`]) equals `input`
    pub fn with_response(mut self, input: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .insert(input.into(), MockResponse::Success(response.into()));
        self
    }

    /// Add a failure response for a specific input
    pub fn with_failure(mut self, input: impl Into<String>, error: impl Into<String>) -> Self {
        self.responses
            .insert(input.into(), MockResponse::Failure(error.into()));
        self
    }

    /// Set a default response for any unmatched input
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(MockResponse::Success(response.into()));
        self
    }

    /// Set a default failure response for any unmatched input
    pub fn with_default_failure(mut self, error: impl Into<String>) -> Self {
        self.default_response = Some(MockResponse::Failure(error.into()));
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times this tool has been called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get the arguments passed to this tool, in call order
    pub fn call_history(&self) -> Vec<Value> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check if the tool was called with specific arguments
    pub fn was_called_with(&self, arguments: &Value) -> bool {
        self.call_history().contains(arguments)
    }
}

#[async_trait]
impl LocalTool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, arguments: Value) -> ToolResult<ToolOutput> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(arguments.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = ToolOutput::Json(arguments).to_text();
        match self.responses.get(&key).or(self.default_response.as_ref()) {
            Some(MockResponse::Success(text)) => Ok(ToolOutput::Text(text.clone())),
            Some(MockResponse::Failure(message)) => Err(ToolError::execution_failed(&self.name, message.clone())),
            None => Ok(ToolOutput::Text(format!("Mock response for: {}", key))),
        }
    }
}

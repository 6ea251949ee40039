//! # Scripted Model Binding
//!
//! A [`ModelBinding`] whose answers are set up in advance, per agent. Each
//! call pops the next scripted answer for the requesting agent; when the
//! script is exhausted a per-agent responder or the global fallback answers.
//! Every request is recorded for later inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use concerto_agent::{ModelBinding, ModelError, ModelEvent, ModelRequest, ModelResponse, ModelStream};
use concerto_core::identifiers::ToolName;
use concerto_core::message::{Role, ToolCall};
use serde_json::Value;

/// Computes an answer from the request.
pub type Responder = Arc<dyn Fn(&ModelRequest) -> Result<ModelResponse, ModelError> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Model binding driven by per-agent scripts.
///
/// ```rust
/// use concerto_testing::ScriptedModel;
///
/// let model = ScriptedModel::new()
///     .reply("Greeter", "Hello!")
///     .call_tool("Adder", "add", serde_json::json!({"text": "5,7"}))
///     .reply("Adder", "12");
/// assert_eq!(model.calls_for("Greeter"), 0);
/// ```
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<String, VecDeque<Result<ModelResponse, ModelError>>>>,
    responders: HashMap<String, Responder>,
    fallback: Option<Responder>,
    latency: HashMap<String, Duration>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, agent: &str, answer: Result<ModelResponse, ModelError>) -> Self {
        lock(&self.scripts)
            .entry(agent.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    /// Queue a plain text answer.
    pub fn reply(self, agent: &str, text: impl Into<String>) -> Self {
        self.push(agent, Ok(ModelResponse::text(text)))
    }

    /// Queue a full response.
    pub fn respond(self, agent: &str, response: ModelResponse) -> Self {
        self.push(agent, Ok(response))
    }

    /// Queue an answer requesting one tool call.
    pub fn call_tool(self, agent: &str, tool: &str, arguments: Value) -> Self {
        let call = ToolCall::new(ToolName::new_unchecked(tool), arguments);
        self.push(agent, Ok(ModelResponse::default().with_tool_call(call)))
    }

    /// Queue a failure.
    pub fn fail(self, agent: &str, error: ModelError) -> Self {
        self.push(agent, Err(error))
    }

    /// Answer for `agent` once its script is exhausted.
    pub fn respond_with<F>(mut self, agent: &str, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<ModelResponse, ModelError> + Send + Sync + 'static,
    {
        self.responders.insert(agent.to_string(), Arc::new(responder));
        self
    }

    /// Answer for any agent without a script or responder.
    pub fn fallback<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<ModelResponse, ModelError> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(responder));
        self
    }

    /// Fallback that answers `"<agent>: <last message>"`.
    pub fn echo_fallback(self) -> Self {
        self.fallback(|request| {
            Ok(ModelResponse::text(format!(
                "{}: {}",
                request.agent,
                last_text(request)
            )))
        })
    }

    /// Delay every answer for `agent`.
    pub fn with_latency(mut self, agent: &str, delay: Duration) -> Self {
        self.latency.insert(agent.to_string(), delay);
        self
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_for(&self, agent: &str) -> Vec<ModelRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.agent.as_str() == agent)
            .cloned()
            .collect()
    }

    pub fn calls_for(&self, agent: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.agent.as_str() == agent)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Scripted answers not consumed yet for `agent`.
    pub fn remaining(&self, agent: &str) -> usize {
        lock(&self.scripts).get(agent).map_or(0, VecDeque::len)
    }

    fn answer(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let agent = request.agent.as_str();
        if let Some(next) = lock(&self.scripts).get_mut(agent).and_then(VecDeque::pop_front) {
            return next;
        }
        if let Some(responder) = self.responders.get(agent) {
            return responder(request);
        }
        match &self.fallback {
            Some(responder) => responder(request),
            None => Err(ModelError::Other(format!("no script left for agent '{}'", agent))),
        }
    }
}

/// Content of the newest user or tool message in the request.
pub fn last_text(request: &ModelRequest) -> &str {
    request
        .history
        .iter()
        .rev()
        .find(|m| matches!(m.role(), Role::User | Role::Tool))
        .map(|m| m.content())
        .unwrap_or_default()
}

#[async_trait]
impl ModelBinding for ScriptedModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.latency.get(request.agent.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        self.answer(&request)
    }

    /// Streams the text word by word.
    async fn generate_stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(async_stream::stream! {
            for word in response.text.split_inclusive(' ') {
                yield Ok(ModelEvent::TextDelta(word.to_string()));
            }
            for call in &response.tool_calls {
                yield Ok(ModelEvent::ToolCall(call.clone()));
            }
            yield Ok(ModelEvent::Done(response));
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

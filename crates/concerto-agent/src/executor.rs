//! The agent execution loop.
//!
//! One [`AgentExecution`] runs one agent on one input: it asks the model for
//! a turn, dispatches the requested tool calls, feeds the results back and
//! repeats until the model answers without tool calls or the iteration cap
//! is reached. Streaming and non-streaming runs share this loop; a streaming
//! run additionally forwards events through an [`EventSink`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use concerto_core::agent::AgentSpec;
use concerto_core::identifiers::AgentName;
use concerto_core::message::{Message, ToolCall};
use concerto_core::tool::{FailureReason, ToolOutput, ToolResult};
use concerto_tools::{LocalTool, ToolKind};
use futures::{FutureExt, StreamExt};
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RuntimeContext;
use crate::error::{FlowError, FlowResult};
use crate::model::{ModelError, ModelEvent, ModelRequest, ModelResponse};
use crate::stream::AgentEvent;

/// Appended to the last answer when an agent runs out of iterations.
pub const TRUNCATION_MARKER: &str = "[truncated: iteration limit reached]";

pub(crate) type EventSink = mpsc::UnboundedSender<AgentEvent>;

/// Agents on the current agent-as-tool call path, outermost first.
///
/// Every invocation carries its own chain; there is no shared counter, so
/// parallel branches never see each other's depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallChain(Vec<AgentName>);

impl CallChain {
    pub fn root(agent: &AgentName) -> Self {
        Self(vec![agent.clone()])
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn agents(&self) -> &[AgentName] {
        &self.0
    }

    /// Extend the chain by `agent`, refusing to grow past `limit` entries.
    pub fn push(&self, agent: &AgentName, limit: usize) -> FlowResult<CallChain> {
        let mut agents = self.0.clone();
        agents.push(agent.clone());
        if agents.len() > limit {
            return Err(FlowError::RecursionLimit {
                chain: agents.iter().map(ToString::to_string).collect(),
                limit,
            });
        }
        Ok(Self(agents))
    }
}

/// A single run of one agent.
pub(crate) struct AgentExecution<'a> {
    ctx: &'a RuntimeContext,
    agent: Arc<AgentSpec>,
    chain: CallChain,
    cancel: CancellationToken,
    events: Option<EventSink>,
}

impl<'a> AgentExecution<'a> {
    pub(crate) fn new(
        ctx: &'a RuntimeContext,
        agent: Arc<AgentSpec>,
        chain: CallChain,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            agent,
            chain,
            cancel,
            events: None,
        }
    }

    pub(crate) fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    fn name(&self) -> &AgentName {
        &self.agent.name
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver means nobody is listening any more.
            let _ = events.send(event);
        }
    }

    async fn record(&self, message: &Message) -> FlowResult<()> {
        self.ctx
            .memory()
            .append(self.ctx.session(), message.clone())
            .await
            .map_err(FlowError::from)
    }

    fn system_prompt(&self) -> String {
        let mut prompt = self.agent.render_system_prompt();
        let tools = self.ctx.tools().specs_for(&self.agent);
        if !tools.is_empty() {
            prompt.push_str("\n\nYou can call the following tools:\n");
            let lines: Vec<String> = tools.iter().map(|t| t.prompt_line()).collect();
            prompt.push_str(&lines.join("\n"));
        }
        prompt
    }

    /// Run the loop to completion.
    pub(crate) async fn run(self, input: Message) -> FlowResult<Message> {
        let settings = self.ctx.settings().clone();
        let started = Instant::now();
        info!(
            agent = %self.name(),
            depth = self.chain.depth(),
            session = %self.ctx.session(),
            "Agent execution started"
        );

        let history = self
            .ctx
            .memory()
            .read(self.ctx.session(), settings.history_window)
            .await?;
        let input = input.with_author(self.name().clone());
        self.record(&input).await?;

        let system_prompt = self.system_prompt();
        let tools = self.ctx.tools().specs_for(&self.agent);
        let mut transcript = vec![input];
        let mut last_text = String::new();

        for iteration in 1..=settings.max_iterations {
            if self.cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }
            let mut conversation = history.clone();
            conversation.extend(transcript.iter().cloned());
            let request = ModelRequest {
                agent: self.name().clone(),
                system_prompt: system_prompt.clone(),
                history: conversation,
                tools: tools.clone(),
                max_tokens: self.agent.max_tokens,
            };

            let response = self.call_model(request).await?;
            if response.is_final() {
                let answer = Message::assistant(response.text).with_author(self.name().clone());
                self.record(&answer).await?;
                info!(
                    agent = %self.name(),
                    iterations = iteration,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Agent execution completed"
                );
                return Ok(answer);
            }

            debug!(
                agent = %self.name(),
                iteration,
                tool_calls = response.tool_calls.len(),
                "Model requested tool calls"
            );
            let request_msg = Message::tool_request(response.text.clone(), response.tool_calls.clone())
                .with_author(self.name().clone());
            self.record(&request_msg).await?;
            transcript.push(request_msg);
            for call in &response.tool_calls {
                self.emit(AgentEvent::ToolCallRequested {
                    agent: self.name().clone(),
                    call: call.clone(),
                });
            }

            for call in &response.tool_calls {
                let result = self.invoke_tool(call).await?.into_message();
                self.record(&result).await?;
                self.emit(AgentEvent::ToolResult {
                    agent: self.name().clone(),
                    message: result.clone(),
                });
                transcript.push(result);
            }
            last_text = response.text;
        }

        warn!(
            agent = %self.name(),
            max_iterations = settings.max_iterations,
            "Iteration limit reached, returning truncated answer"
        );
        let text = if last_text.trim().is_empty() {
            TRUNCATION_MARKER.to_string()
        } else {
            format!("{}\n{}", last_text, TRUNCATION_MARKER)
        };
        let answer = Message::assistant(text)
            .with_author(self.name().clone())
            .with_metadata("truncated", json!(true));
        self.record(&answer).await?;
        Ok(answer)
    }

    /// Call the model with timeout and bounded retry.
    async fn call_model(&self, request: ModelRequest) -> FlowResult<ModelResponse> {
        let settings = self.ctx.settings();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FlowError::Cancelled),
                outcome = tokio::time::timeout(settings.model_timeout, self.generate(request.clone())) => outcome,
            };
            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => ModelError::Timeout(settings.model_timeout),
            };

            if !error.is_retryable() || attempt > settings.model_retries {
                warn!(
                    agent = %self.name(),
                    attempts = attempt,
                    error = %error,
                    "Model call failed"
                );
                return Err(FlowError::ModelCall {
                    agent: self.name().to_string(),
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = with_jitter(settings.backoff_for(attempt));
            warn!(
                agent = %self.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying model call"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FlowError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let model = self.ctx.app().model();
        let Some(events) = &self.events else {
            return model.generate(request).await;
        };

        let mut stream = model.generate_stream(request).await?;
        while let Some(event) = stream.next().await {
            match event? {
                ModelEvent::TextDelta(text) => {
                    let _ = events.send(AgentEvent::TextDelta {
                        agent: self.name().clone(),
                        text,
                    });
                }
                // Reported together with the final response.
                ModelEvent::ToolCall(_) => {}
                ModelEvent::Done(response) => return Ok(response),
            }
        }
        Err(ModelError::InvalidResponse(
            "stream ended without a final response".to_string(),
        ))
    }

    /// Dispatch one tool call.
    ///
    /// Tool failures come back as failed [`ToolResult`]s. Only cancellation
    /// and the call-depth limit abort the execution.
    async fn invoke_tool(&self, call: &ToolCall) -> FlowResult<ToolResult> {
        let entry = match self.ctx.tools().resolve_for(&self.agent, call.name.as_str()) {
            Ok(entry) => entry,
            Err(reason) => {
                warn!(agent = %self.name(), tool = %call.name, "Tool not available to agent");
                return Ok(ToolResult::failure(call, reason));
            }
        };

        let started = Instant::now();
        let outcome = match &entry.kind {
            ToolKind::Local(tool) => self.call_local(tool.as_ref(), call).await?,
            ToolKind::Remote { server } => self.call_remote(server, call).await?,
            ToolKind::Agent(callee) => self.call_agent(callee, call).await?,
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => debug!(
                agent = %self.name(),
                tool = %call.name,
                kind = entry.kind.label(),
                duration_ms,
                "Tool call succeeded"
            ),
            Err(reason) => warn!(
                agent = %self.name(),
                tool = %call.name,
                kind = entry.kind.label(),
                duration_ms,
                error = %reason,
                "Tool call failed"
            ),
        }
        Ok(match outcome {
            Ok(output) => ToolResult::success(call, output),
            Err(reason) => ToolResult::failure(call, reason),
        })
    }

    async fn call_local(
        &self,
        tool: &dyn LocalTool,
        call: &ToolCall,
    ) -> FlowResult<Result<ToolOutput, FailureReason>> {
        let timeout = self.ctx.settings().tool_timeout;
        let invocation = AssertUnwindSafe(tool.call(call.arguments.clone())).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FlowError::Cancelled),
            outcome = tokio::time::timeout(timeout, invocation) => outcome,
        };
        Ok(match outcome {
            Err(_) => Err(timeout_reason(call, timeout)),
            Ok(Err(_panic)) => Err(FailureReason::ExecutionFailed {
                message: format!("tool '{}' panicked", call.name),
            }),
            Ok(Ok(result)) => result.map_err(FailureReason::from),
        })
    }

    async fn call_remote(
        &self,
        server: &str,
        call: &ToolCall,
    ) -> FlowResult<Result<ToolOutput, FailureReason>> {
        let timeout = self.ctx.settings().tool_timeout;
        let invocation = self
            .ctx
            .gateway()
            .call(server, call.name.as_str(), call.arguments.clone());
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FlowError::Cancelled),
            outcome = tokio::time::timeout(timeout, invocation) => outcome,
        };
        Ok(match outcome {
            Err(_) => Err(timeout_reason(call, timeout)),
            Ok(result) => result.map_err(|e| e.to_failure_reason()),
        })
    }

    /// Run another agent as a tool, one level deeper on the call chain.
    async fn call_agent(
        &self,
        callee: &AgentName,
        call: &ToolCall,
    ) -> FlowResult<Result<ToolOutput, FailureReason>> {
        let chain = self.chain.push(callee, self.ctx.settings().max_call_depth)?;
        let Some(spec) = self.ctx.app().agent(callee.as_str()) else {
            return Ok(Err(FailureReason::NotFound {
                tool: callee.to_string(),
            }));
        };
        let input = Message::user(agent_input(&call.arguments));
        let nested = AgentExecution::new(self.ctx, Arc::clone(spec), chain, self.cancel.clone());
        match self.ctx.execute(nested, input).await {
            Ok(answer) => Ok(Ok(ToolOutput::Text(answer.into_content()))),
            Err(e @ (FlowError::RecursionLimit { .. } | FlowError::Cancelled)) => Err(e),
            Err(e) => Ok(Err(FailureReason::AgentFailed {
                agent: callee.to_string(),
                message: e.to_string(),
            })),
        }
    }
}

fn timeout_reason(call: &ToolCall, timeout: Duration) -> FailureReason {
    FailureReason::Timeout {
        tool: call.name.to_string(),
        duration_ms: timeout.as_millis() as u64,
    }
}

/// Input text for an agent called as a tool: the `input` field, a bare
/// string, or the raw arguments.
fn agent_input(arguments: &Value) -> String {
    match arguments {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("input") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => arguments.to_string(),
        },
        other => other.to_string(),
    }
}

/// Add up to 50% random jitter to a backoff delay.
fn with_jitter(base: Duration) -> Duration {
    let spread = (base.as_millis() / 2) as u64;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=spread))
}

//! Runtime context: the live half of an application.
//!
//! A [`RuntimeContext`] binds an [`Application`] to one session. Starting it
//! connects the capability servers and builds the tool table; closing it
//! cancels whatever is still running, disconnects the servers and flushes
//! session memory. Closing happens exactly once, whether it is triggered by
//! [`RuntimeContext::close`], by the end of [`RuntimeContext::scope`], or by
//! dropping the last handle.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use concerto_core::agent::AgentSpec;
use concerto_core::error::{ConfigError, MemoryError};
use concerto_core::identifiers::SessionId;
use concerto_core::message::Message;
use concerto_core::pattern::StepRef;
use concerto_mcp::{CapabilityError, CapabilityGateway};
use concerto_memory::MemoryStore;
use concerto_tools::ToolTable;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::app::Application;
use crate::error::{FlowError, FlowResult};
use crate::executor::{AgentExecution, CallChain};
use crate::patterns;
use crate::settings::RuntimeSettings;
use crate::stream::{AgentEvent, AgentStream};

/// Handle to a running application session. Cheap to clone.
#[derive(Clone)]
pub struct RuntimeContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    app: Arc<Application>,
    session: SessionId,
    tools: ToolTable,
    gateway: Arc<CapabilityGateway>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl RuntimeContext {
    /// Connect capability servers, discover their tools and build the tool
    /// table for `session`.
    pub async fn start(app: Arc<Application>, session: SessionId) -> FlowResult<Self> {
        let mut builder = ToolTable::builder();
        for tool in app.local_tools() {
            builder = builder.local(Arc::clone(tool)).map_err(ConfigError::from)?;
        }
        for agent in app.agents() {
            builder = builder.agent(agent);
        }

        let gateway = CapabilityGateway::connect(app.servers()).await?;
        for tool in gateway.tools() {
            builder = builder.remote(tool.clone());
        }
        let tools = builder.build();

        for agent in app.agents() {
            for tool in agent.tools.iter().filter(|t| !tools.contains(t.as_str())) {
                warn!(
                    agent = %agent.name,
                    tool = %tool,
                    "Bound tool is not provided by any local tool or capability server"
                );
            }
        }

        info!(
            session = %session,
            tools = tools.len(),
            servers = gateway.servers().len(),
            "Runtime context started"
        );
        Ok(Self {
            inner: Arc::new(ContextInner {
                app,
                session,
                tools,
                gateway: Arc::new(gateway),
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Start a context, run `body` with it, and close the context afterwards
    /// whatever `body` returned.
    ///
    /// An error from `body` takes precedence over an error from closing.
    pub async fn scope<F, Fut, T>(app: Arc<Application>, session: SessionId, body: F) -> FlowResult<T>
    where
        F: FnOnce(RuntimeContext) -> Fut,
        Fut: Future<Output = FlowResult<T>>,
    {
        let ctx = Self::start(app, session).await?;
        let result = body(ctx.clone()).await;
        let closed = ctx.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Context teardown failed after run error");
                Err(e)
            }
        }
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.inner.app
    }

    pub fn session(&self) -> &SessionId {
        &self.inner.session
    }

    pub fn settings(&self) -> &RuntimeSettings {
        self.inner.app.settings()
    }

    pub fn tools(&self) -> &ToolTable {
        &self.inner.tools
    }

    pub(crate) fn memory(&self) -> &Arc<dyn MemoryStore> {
        self.inner.app.memory()
    }

    pub(crate) fn gateway(&self) -> &CapabilityGateway {
        &self.inner.gateway
    }

    /// Request cancellation of every run on this context.
    pub fn cancel(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!(session = %self.session(), "Runtime context cancelled");
        }
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> FlowResult<()> {
        if self.is_closed() || self.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        Ok(())
    }

    fn agent_spec(&self, name: &str) -> FlowResult<Arc<AgentSpec>> {
        self.inner
            .app
            .agent(name)
            .cloned()
            .ok_or_else(|| FlowError::AgentNotFound(name.to_string()))
    }

    /// Run one agent on `input` and return its final answer.
    pub async fn call_agent(&self, agent: &str, input: impl Into<Message>) -> FlowResult<Message> {
        self.ensure_open()?;
        let spec = self.agent_spec(agent)?;
        let chain = CallChain::root(&spec.name);
        let execution = AgentExecution::new(self, spec, chain, self.inner.cancel.clone());
        self.execute(execution, input.into()).await
    }

    /// Run a registered flow on `input`.
    pub async fn run_flow(&self, flow: &str, input: impl Into<Message>) -> FlowResult<Message> {
        self.ensure_open()?;
        let registered = self
            .inner
            .app
            .flow(flow)
            .cloned()
            .ok_or_else(|| FlowError::FlowNotFound(flow.to_string()))?;
        let span = info_span!("flow", flow = %registered.name, session = %self.session());
        async {
            info!(pattern = %registered.pattern.kind(), "Flow started");
            let result =
                patterns::run_pattern(self, &registered.pattern, input.into(), &self.inner.cancel).await;
            match &result {
                Ok(_) => info!("Flow completed"),
                Err(e) => warn!(error = %e, code = e.error_code(), "Flow failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run the application's default agent or flow on `input`.
    pub async fn run_default(&self, input: impl Into<Message>) -> FlowResult<Message> {
        let target = self
            .inner
            .app
            .default_target()
            .ok_or(ConfigError::NoDefaultTarget)?
            .to_step();
        match &target {
            StepRef::Flow { name } => self.run_flow(name.as_str(), input).await,
            other => {
                self.ensure_open()?;
                self.run_target(other, input.into(), &self.inner.cancel)
                    .await
            }
        }
    }

    /// Run one agent, reporting progress as a stream of events.
    ///
    /// The stream ends with a single [`AgentEvent::Completed`] or an error.
    /// Dropping the stream cancels the run. The final answer is the same
    /// message [`RuntimeContext::call_agent`] would have returned.
    pub fn call_agent_streaming(&self, agent: &str, input: impl Into<Message>) -> AgentStream {
        let prepared = self
            .ensure_open()
            .and_then(|()| self.agent_spec(agent));
        let spec = match prepared {
            Ok(spec) => spec,
            Err(e) => return Box::pin(futures::stream::once(async move { Err::<AgentEvent, _>(e) })),
        };

        let ctx = self.clone();
        let input: Message = input.into();
        let cancel = self.inner.cancel.child_token();
        let (events, mut receiver) = mpsc::unbounded_channel();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let chain = CallChain::root(&spec.name);
            let execution = AgentExecution::new(&ctx, spec, chain, run_cancel).with_events(events);
            ctx.execute(execution, input).await
        });

        Box::pin(async_stream::stream! {
            let _guard = cancel.drop_guard();
            while let Some(event) = receiver.recv().await {
                yield Ok(event);
            }
            match handle.await {
                Ok(Ok(answer)) => yield Ok(AgentEvent::Completed(answer)),
                Ok(Err(e)) => yield Err(e),
                Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                Err(_) => yield Err(FlowError::Cancelled),
            }
        })
    }

    /// Read the session log, newest `window` messages (all when `None`).
    pub async fn history(&self, window: Option<usize>) -> FlowResult<Vec<Message>> {
        Ok(self.memory().read(self.session(), window).await?)
    }

    /// Cancel in-flight work, disconnect capability servers and flush memory.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub async fn close(&self) -> FlowResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.cancel.cancel();
        let result = teardown(Arc::clone(&self.inner.gateway), Arc::clone(self.memory())).await;
        match &result {
            Ok(()) => info!(session = %self.session(), "Runtime context closed"),
            Err(e) => warn!(session = %self.session(), error = %e, "Runtime context closed with errors"),
        }
        result
    }

    /// Run an agent execution. Boxed so agent-as-tool calls can recurse.
    pub(crate) fn execute<'a>(
        &'a self,
        execution: AgentExecution<'a>,
        input: Message,
    ) -> BoxFuture<'a, FlowResult<Message>> {
        Box::pin(execution.run(input))
    }

    /// Run a step target: an agent from a fresh call chain, a registered flow,
    /// or an inline pattern.
    pub(crate) fn run_target<'a>(
        &'a self,
        target: &'a StepRef,
        input: Message,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, FlowResult<Message>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }
            match target {
                StepRef::Agent { name } => {
                    let spec = self.agent_spec(name.as_str())?;
                    let chain = CallChain::root(&spec.name);
                    let execution = AgentExecution::new(self, spec, chain, cancel.clone());
                    self.execute(execution, input).await
                }
                StepRef::Flow { name } => {
                    let flow = self
                        .inner
                        .app
                        .flow(name.as_str())
                        .cloned()
                        .ok_or_else(|| FlowError::FlowNotFound(name.to_string()))?;
                    debug!(flow = %name, "Entering nested flow");
                    patterns::run_pattern(self, &flow.pattern, input, cancel).await
                }
                StepRef::Pattern { pattern } => patterns::run_pattern(self, pattern, input, cancel).await,
            }
        })
    }
}

async fn teardown(gateway: Arc<CapabilityGateway>, memory: Arc<dyn MemoryStore>) -> FlowResult<()> {
    let disconnected: Result<(), CapabilityError> = gateway.close().await;
    let flushed: Result<(), MemoryError> = memory.flush().await;
    disconnected?;
    flushed?;
    Ok(())
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let gateway = Arc::clone(&self.gateway);
        let memory = Arc::clone(self.app.memory());
        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(session = %session, "Runtime context dropped without close, scheduling teardown");
                runtime.spawn(async move {
                    if let Err(e) = teardown(gateway, memory).await {
                        warn!(session = %session, error = %e, "Deferred context teardown failed");
                    }
                });
            }
            Err(_) => {
                warn!(session = %session, "Runtime context dropped outside a runtime, teardown skipped");
            }
        }
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("session", &self.inner.session)
            .field("tools", &self.inner.tools.len())
            .field("cancelled", &self.is_cancelled())
            .field("closed", &self.is_closed())
            .finish()
    }
}

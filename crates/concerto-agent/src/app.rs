//! Application registry.
//!
//! An [`Application`] is the immutable set of agents, flows, local tools,
//! capability servers and settings that every runtime context of the
//! application shares. It is assembled with an [`ApplicationBuilder`], which
//! validates the whole registry once so nothing has to be checked again
//! during a run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use concerto_core::agent::AgentSpec;
use concerto_core::error::{ConfigError, ConfigResult};
use concerto_core::identifiers::{AgentName, FlowName, SessionId, ToolName};
use concerto_core::pattern::{Flow, Pattern, StepRef, Termination};
use concerto_mcp::ServerConnector;
use concerto_memory::{InMemoryStore, MemoryStore};
use concerto_tools::LocalTool;
use serde::Serialize;
use tracing::info;

use crate::context::RuntimeContext;
use crate::error::FlowResult;
use crate::model::ModelBinding;
use crate::settings::RuntimeSettings;

/// Target used by interactive chat and by runs that name no target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultTarget {
    Agent(AgentName),
    Flow(FlowName),
}

impl DefaultTarget {
    pub fn to_step(&self) -> StepRef {
        match self {
            DefaultTarget::Agent(name) => StepRef::agent(name.clone()),
            DefaultTarget::Flow(name) => StepRef::flow(name.clone()),
        }
    }
}

impl fmt::Display for DefaultTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultTarget::Agent(name) => write!(f, "agent '{}'", name),
            DefaultTarget::Flow(name) => write!(f, "flow '{}'", name),
        }
    }
}

/// Validated, read-only registry shared by all contexts of an application.
pub struct Application {
    agents: HashMap<AgentName, Arc<AgentSpec>>,
    agent_order: Vec<AgentName>,
    flows: HashMap<FlowName, Arc<Flow>>,
    flow_order: Vec<FlowName>,
    local_tools: Vec<Arc<dyn LocalTool>>,
    servers: Vec<Arc<dyn ServerConnector>>,
    model: Arc<dyn ModelBinding>,
    memory: Arc<dyn MemoryStore>,
    settings: RuntimeSettings,
    default_target: Option<DefaultTarget>,
}

impl Application {
    pub fn builder(model: Arc<dyn ModelBinding>) -> ApplicationBuilder {
        ApplicationBuilder::new(model)
    }

    pub fn agent(&self, name: &str) -> Option<&Arc<AgentSpec>> {
        self.agents.get(name)
    }

    pub fn flow(&self, name: &str) -> Option<&Arc<Flow>> {
        self.flows.get(name)
    }

    /// Agents in registration order.
    pub fn agents(&self) -> impl Iterator<Item = &Arc<AgentSpec>> {
        self.agent_order.iter().filter_map(|name| self.agents.get(name))
    }

    /// Flows in registration order.
    pub fn flows(&self) -> impl Iterator<Item = &Arc<Flow>> {
        self.flow_order.iter().filter_map(|name| self.flows.get(name))
    }

    pub fn local_tools(&self) -> &[Arc<dyn LocalTool>] {
        &self.local_tools
    }

    pub fn servers(&self) -> &[Arc<dyn ServerConnector>] {
        &self.servers
    }

    pub fn model(&self) -> &Arc<dyn ModelBinding> {
        &self.model
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn default_target(&self) -> Option<&DefaultTarget> {
        self.default_target.as_ref()
    }

    /// Start a runtime context on a fresh session.
    pub async fn start(self: &Arc<Self>) -> FlowResult<RuntimeContext> {
        RuntimeContext::start(Arc::clone(self), SessionId::generate()).await
    }

    /// Start a runtime context that continues an existing session.
    pub async fn start_session(self: &Arc<Self>, session: SessionId) -> FlowResult<RuntimeContext> {
        RuntimeContext::start(Arc::clone(self), session).await
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("agents", &self.agent_order)
            .field("flows", &self.flow_order)
            .field("local_tools", &self.local_tools.len())
            .field("servers", &self.servers.len())
            .field("model", &self.model.name())
            .field("memory", &self.memory.backend())
            .field("settings", &self.settings)
            .field("default_target", &self.default_target)
            .finish()
    }
}

/// Collects registrations and validates them into an [`Application`].
///
/// ```rust
/// # use std::sync::Arc;
/// # use async_trait::async_trait;
/// use concerto_agent::{Application, ModelBinding, ModelError, ModelRequest, ModelResponse};
/// use concerto_core::{AgentName, AgentSpec};
///
/// struct Silent;
///
/// #[async_trait]
/// impl ModelBinding for Silent {
///     async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
///         Ok(ModelResponse::text(""))
///     }
/// }
///
/// let app = Application::builder(Arc::new(Silent))
///     .agent(AgentSpec::new(AgentName::parse("Greeter").unwrap()))
///     .build()
///     .unwrap();
/// assert!(app.agent("Greeter").is_some());
/// ```
pub struct ApplicationBuilder {
    model: Arc<dyn ModelBinding>,
    memory: Option<Arc<dyn MemoryStore>>,
    settings: RuntimeSettings,
    agents: Vec<AgentSpec>,
    flows: Vec<Flow>,
    local_tools: Vec<Arc<dyn LocalTool>>,
    servers: Vec<Arc<dyn ServerConnector>>,
    default_target: Option<DefaultTarget>,
}

impl ApplicationBuilder {
    pub fn new(model: Arc<dyn ModelBinding>) -> Self {
        Self {
            model,
            memory: None,
            settings: RuntimeSettings::default(),
            agents: Vec::new(),
            flows: Vec::new(),
            local_tools: Vec::new(),
            servers: Vec::new(),
            default_target: None,
        }
    }

    /// Session store; defaults to an [`InMemoryStore`].
    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn agent(mut self, agent: AgentSpec) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = AgentSpec>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn flows(mut self, flows: impl IntoIterator<Item = Flow>) -> Self {
        self.flows.extend(flows);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.local_tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn LocalTool>>) -> Self {
        self.local_tools.extend(tools);
        self
    }

    /// Register a capability server, connected when a context starts.
    pub fn server(mut self, server: Arc<dyn ServerConnector>) -> Self {
        self.servers.push(server);
        self
    }

    pub fn default_target(mut self, target: DefaultTarget) -> Self {
        self.default_target = Some(target);
        self
    }

    pub fn default_agent(self, agent: AgentName) -> Self {
        self.default_target(DefaultTarget::Agent(agent))
    }

    pub fn default_flow(self, flow: FlowName) -> Self {
        self.default_target(DefaultTarget::Flow(flow))
    }

    /// Validate the registrations and freeze them.
    ///
    /// Rejects duplicate names (agents, flows and local tools share one
    /// namespace), references to unknown agents, flows or tools, structurally
    /// invalid patterns and cycles between flows.
    pub fn build(self) -> ConfigResult<Arc<Application>> {
        self.settings.validate()?;

        let mut names: HashMap<String, &'static str> = HashMap::new();
        let mut local_names: HashSet<ToolName> = HashSet::new();
        for tool in &self.local_tools {
            let name = ToolName::parse(tool.name())?;
            claim(&mut names, name.as_str(), "tool")?;
            local_names.insert(name);
        }
        for agent in &self.agents {
            claim(&mut names, agent.name.as_str(), "agent")?;
        }
        for flow in &self.flows {
            claim(&mut names, flow.name.as_str(), "flow")?;
        }
        let mut server_names = HashSet::new();
        for server in &self.servers {
            if !server_names.insert(server.name().to_string()) {
                return Err(ConfigError::DuplicateName {
                    name: server.name().to_string(),
                    existing: "capability server".to_string(),
                });
            }
        }

        let agent_names: HashSet<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
        let flow_names: HashSet<&str> = self.flows.iter().map(|f| f.name.as_str()).collect();

        for agent in &self.agents {
            let location = format!("agent '{}'", agent.name);
            for callee in &agent.callable_agents {
                if !agent_names.contains(callee.as_str()) {
                    return Err(ConfigError::UnknownAgent {
                        referenced_by: location,
                        name: callee.to_string(),
                    });
                }
            }
            // With capability servers registered, remaining names may be
            // advertised remotely; that is only known once a context starts.
            if self.servers.is_empty() {
                if let Some(tool) = agent.tools.iter().find(|t| !local_names.contains(*t)) {
                    return Err(ConfigError::UnknownTool {
                        agent: agent.name.to_string(),
                        name: tool.to_string(),
                    });
                }
            }
        }

        for flow in &self.flows {
            let location = format!("flow '{}'", flow.name);
            validate_pattern(&flow.pattern, &location)?;
            for agent in flow.pattern.referenced_agents() {
                if !agent_names.contains(agent.as_str()) {
                    return Err(ConfigError::UnknownAgent {
                        referenced_by: location,
                        name: agent.to_string(),
                    });
                }
            }
            for referenced in flow.pattern.referenced_flows() {
                if !flow_names.contains(referenced.as_str()) {
                    return Err(ConfigError::UnknownFlow {
                        referenced_by: location,
                        name: referenced.to_string(),
                    });
                }
            }
        }
        detect_flow_cycles(&self.flows)?;

        match &self.default_target {
            Some(DefaultTarget::Agent(name)) if !agent_names.contains(name.as_str()) => {
                return Err(ConfigError::UnknownAgent {
                    referenced_by: "default target".to_string(),
                    name: name.to_string(),
                });
            }
            Some(DefaultTarget::Flow(name)) if !flow_names.contains(name.as_str()) => {
                return Err(ConfigError::UnknownFlow {
                    referenced_by: "default target".to_string(),
                    name: name.to_string(),
                });
            }
            _ => {}
        }

        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn MemoryStore>);

        info!(
            agents = self.agents.len(),
            flows = self.flows.len(),
            local_tools = self.local_tools.len(),
            servers = self.servers.len(),
            model = self.model.name(),
            memory = memory.backend(),
            "Application built"
        );

        let agent_order = self.agents.iter().map(|a| a.name.clone()).collect();
        let flow_order = self.flows.iter().map(|f| f.name.clone()).collect();
        Ok(Arc::new(Application {
            agents: self
                .agents
                .into_iter()
                .map(|agent| (agent.name.clone(), Arc::new(agent)))
                .collect(),
            agent_order,
            flows: self
                .flows
                .into_iter()
                .map(|flow| (flow.name.clone(), Arc::new(flow)))
                .collect(),
            flow_order,
            local_tools: self.local_tools,
            servers: self.servers,
            model: self.model,
            memory,
            settings: self.settings,
            default_target: self.default_target,
        }))
    }
}

fn claim(names: &mut HashMap<String, &'static str>, name: &str, kind: &'static str) -> ConfigResult<()> {
    if let Some(existing) = names.get(name) {
        return Err(ConfigError::DuplicateName {
            name: name.to_string(),
            existing: (*existing).to_string(),
        });
    }
    names.insert(name.to_string(), kind);
    Ok(())
}

/// Structural checks for a pattern and every inline pattern beneath it.
fn validate_pattern(root: &Pattern, location: &str) -> ConfigResult<()> {
    let mut patterns = vec![root];
    root.for_each_ref(&mut |step| {
        if let StepRef::Pattern { pattern } = step {
            patterns.push(pattern);
        }
    });
    patterns
        .into_iter()
        .try_for_each(|pattern| validate_shape(pattern, location))
}

fn validate_shape(pattern: &Pattern, location: &str) -> ConfigResult<()> {
    let kind = pattern.kind().to_string();
    let invalid = |reason: String| ConfigError::invalid_pattern(kind.clone(), location, reason);
    match pattern {
        Pattern::Sequential { .. } => Ok(()),
        Pattern::Parallel {
            tasks, max_in_flight, ..
        } => {
            let mut seen = HashSet::new();
            for task in tasks.iter() {
                if task.name.trim().is_empty() {
                    return Err(invalid("task names must not be empty".to_string()));
                }
                if !seen.insert(task.name.as_str()) {
                    return Err(invalid(format!("task '{}' is listed twice", task.name)));
                }
            }
            if *max_in_flight == Some(0) {
                return Err(invalid("max_in_flight must be at least 1".to_string()));
            }
            Ok(())
        }
        Pattern::Router { candidates, .. } => {
            let mut seen = HashSet::new();
            for candidate in candidates.iter() {
                let Some(name) = candidate.name() else {
                    return Err(invalid("candidates must name an agent or a flow".to_string()));
                };
                if !seen.insert(name) {
                    return Err(invalid(format!("candidate '{}' is listed twice", name)));
                }
            }
            Ok(())
        }
        Pattern::Discussion {
            moderator,
            max_rounds,
            termination,
            ..
        } => {
            if *max_rounds == 0 {
                return Err(invalid("max_rounds must be at least 1".to_string()));
            }
            if let Termination::Consensus { marker } = termination {
                if moderator.is_none() {
                    return Err(invalid("consensus termination requires a moderator".to_string()));
                }
                if marker.trim().is_empty() {
                    return Err(invalid("consensus marker must not be empty".to_string()));
                }
            }
            Ok(())
        }
    }
}

/// Depth-first search over flow-to-flow references.
fn detect_flow_cycles(flows: &[Flow]) -> ConfigResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> ConfigResult<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Err(ConfigError::FlowCycle { cycle });
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        stack.push(name);
        for next in edges.get(name).into_iter().flatten() {
            visit(next, edges, marks, stack)?;
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let edges: HashMap<&str, Vec<&str>> = flows
        .iter()
        .map(|flow| {
            let targets = flow
                .pattern
                .referenced_flows()
                .into_iter()
                .map(FlowName::as_str)
                .collect();
            (flow.name.as_str(), targets)
        })
        .collect();

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    for flow in flows {
        visit(flow.name.as_str(), &edges, &mut marks, &mut stack)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelRequest, ModelResponse};
    use async_trait::async_trait;
    use concerto_core::collections::NonEmptyVec;
    use concerto_core::pattern::ParallelTask;
    use concerto_tools::EchoTool;

    struct Silent;

    #[async_trait]
    impl ModelBinding for Silent {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
            Ok(ModelResponse::default())
        }
    }

    fn builder() -> ApplicationBuilder {
        Application::builder(Arc::new(Silent))
    }

    fn agent(name: &str) -> AgentSpec {
        AgentSpec::new(AgentName::new_unchecked(name))
    }

    fn agent_ref(name: &str) -> StepRef {
        StepRef::agent(AgentName::new_unchecked(name))
    }

    fn flow_ref(name: &str) -> StepRef {
        StepRef::flow(FlowName::new_unchecked(name))
    }

    fn flow(name: &str, steps: Vec<StepRef>) -> Flow {
        let steps = NonEmptyVec::try_from(steps).unwrap();
        Flow::new(FlowName::new_unchecked(name), Pattern::sequential(steps))
    }

    #[test]
    fn test_valid_application() {
        let app = builder()
            .tool(Arc::new(EchoTool::new()))
            .agent(agent("A").with_tool(ToolName::new_unchecked("echo")))
            .agent(agent("B").with_callable_agent(AgentName::new_unchecked("A")))
            .flow(flow("pipeline", vec![agent_ref("A"), agent_ref("B")]))
            .default_flow(FlowName::new_unchecked("pipeline"))
            .build()
            .unwrap();

        let names: Vec<&str> = app.agents().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(app.flow("pipeline").is_some());
        assert_eq!(app.memory().backend(), "in_memory");
    }

    #[test]
    fn test_duplicate_names_across_kinds() {
        let err = builder()
            .agent(agent("echo"))
            .tool(Arc::new(EchoTool::new()))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateName {
                name: "echo".into(),
                existing: "tool".into()
            }
        );

        let err = builder()
            .agent(agent("A"))
            .flow(flow("A", vec![agent_ref("A")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }

    #[test]
    fn test_dangling_references() {
        let err = builder()
            .agent(agent("A"))
            .flow(flow("f", vec![agent_ref("A"), agent_ref("Ghost")]))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownAgent {
                referenced_by: "flow 'f'".into(),
                name: "Ghost".into()
            }
        );

        let err = builder()
            .agent(agent("A"))
            .flow(flow("f", vec![flow_ref("missing")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFlow { .. }));

        let err = builder()
            .agent(agent("A").with_callable_agent(AgentName::new_unchecked("B")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent { .. }));
    }

    #[test]
    fn test_unknown_tool_without_servers() {
        let err = builder()
            .agent(agent("A").with_tool(ToolName::new_unchecked("search")))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_UNKNOWN_TOOL");
    }

    #[test]
    fn test_flow_cycle_is_rejected() {
        let err = builder()
            .agent(agent("A"))
            .flow(flow("a", vec![agent_ref("A"), flow_ref("b")]))
            .flow(flow("b", vec![flow_ref("c")]))
            .flow(flow("c", vec![flow_ref("a")]))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::FlowCycle {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_self_referencing_flow_is_a_cycle() {
        let err = builder()
            .flow(flow("loop", vec![flow_ref("loop")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FlowCycle { .. }));
    }

    #[test]
    fn test_router_requires_named_candidates() {
        let inline = StepRef::inline(Pattern::sequential(NonEmptyVec::singleton(agent_ref("A"))));
        let router = Pattern::router(agent_ref("A"), NonEmptyVec::singleton(inline), agent_ref("A"));
        let err = builder()
            .agent(agent("A"))
            .flow(Flow::new(FlowName::new_unchecked("r"), router))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "router"));
    }

    #[test]
    fn test_consensus_requires_moderator() {
        let discussion = Pattern::Discussion {
            participants: NonEmptyVec::singleton(AgentName::new_unchecked("A")),
            moderator: None,
            max_rounds: 3,
            termination: Termination::Consensus {
                marker: "AGREED".into(),
            },
        };
        let err = builder()
            .agent(agent("A"))
            .flow(Flow::new(FlowName::new_unchecked("d"), discussion))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("requires a moderator"));
    }

    #[test]
    fn test_duplicate_parallel_tasks_in_inline_pattern() {
        let tasks = NonEmptyVec::new(
            ParallelTask::new("x", agent_ref("A")),
            vec![ParallelTask::new("x", agent_ref("A"))],
        );
        let nested = StepRef::inline(Pattern::parallel(tasks));
        let err = builder()
            .agent(agent("A"))
            .flow(flow("outer", vec![agent_ref("A"), nested]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_default_target() {
        let err = builder()
            .agent(agent("A"))
            .default_agent(AgentName::new_unchecked("B"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent { ref referenced_by, .. } if referenced_by == "default target"));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let err = builder()
            .settings(RuntimeSettings::default().with_max_iterations(0))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_INVALID_SETTING");
    }
}

//! Agent declarations.
//!
//! An [`AgentSpec`] is pure data: a name, a description, a system prompt
//! template and the tools and agents it may call. It is registered once at
//! application setup and shared read-only by every execution.

use crate::identifiers::{AgentName, ToolName};
use serde::{Deserialize, Serialize};

/// Default template used when an agent declares no system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are {agent}. {description}";

/// Declaration of an agent.
///
/// ```rust
/// use concerto_core::agent::AgentSpec;
/// use concerto_core::identifiers::{AgentName, ToolName};
///
/// let spec = AgentSpec::new(AgentName::parse("Greeter").unwrap())
///     .with_description("Greets the user")
///     .with_system_prompt("You are {agent}: {description}.")
///     .with_tool(ToolName::parse("echo").unwrap());
///
/// assert_eq!(spec.render_system_prompt(), "You are Greeter: Greets the user.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: AgentName,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Tools this agent is allowed to call
    #[serde(default)]
    pub tools: Vec<ToolName>,
    /// Agents this agent is allowed to call as tools
    #[serde(default)]
    pub callable_agents: Vec<AgentName>,
    /// Output token hint forwarded to the model binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl AgentSpec {
    pub fn new(name: AgentName) -> Self {
        Self {
            name,
            description: String::new(),
            system_prompt: default_system_prompt(),
            tools: Vec::new(),
            callable_agents: Vec::new(),
            max_tokens: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Self {
        self.system_prompt = template.into();
        self
    }

    pub fn with_tool(mut self, tool: ToolName) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolName>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_callable_agent(mut self, agent: AgentName) -> Self {
        self.callable_agents.push(agent);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Render the system prompt, substituting `{agent}` and `{description}`.
    pub fn render_system_prompt(&self) -> String {
        self.system_prompt
            .replace("{agent}", self.name.as_str())
            .replace("{description}", &self.description)
            .trim()
            .to_string()
    }

    /// Whether the agent is bound to the named tool.
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t.as_str() == tool)
    }

    /// Whether the agent may call the named agent as a tool.
    pub fn can_call(&self, agent: &str) -> bool {
        self.callable_agents.iter().any(|a| a.as_str() == agent)
    }
}

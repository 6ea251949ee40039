//! The per-context tool table.
//!
//! A [`ToolTable`] is built once when a runtime context starts and is
//! read-only afterwards. It maps every invocable name to where the call goes:
//! an in-process [`LocalTool`], a tool on a connected capability server, or
//! another agent.

use concerto_core::agent::AgentSpec;
use concerto_core::identifiers::{AgentName, NameError, ToolName};
use concerto_core::tool::{FailureReason, ToolSpec};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::local::LocalTool;

/// A tool advertised by a capability server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    /// Name of the server that advertised the tool
    pub server: String,
    pub spec: ToolSpec,
}

/// Where a tool call is dispatched.
#[derive(Clone)]
pub enum ToolKind {
    Local(Arc<dyn LocalTool>),
    Remote { server: String },
    Agent(AgentName),
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Local(_) => "local",
            ToolKind::Remote { .. } => "remote",
            ToolKind::Agent(_) => "agent",
        }
    }
}

impl fmt::Debug for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Local(tool) => f.debug_tuple("Local").field(&tool.name()).finish(),
            ToolKind::Remote { server } => f.debug_struct("Remote").field("server", server).finish(),
            ToolKind::Agent(name) => f.debug_tuple("Agent").field(name).finish(),
        }
    }
}

/// One row of the table.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub spec: ToolSpec,
    pub kind: ToolKind,
}

/// Immutable name → tool mapping.
#[derive(Debug, Clone, Default)]
pub struct ToolTable {
    entries: HashMap<ToolName, ToolEntry>,
}

impl ToolTable {
    pub fn builder() -> ToolTableBuilder {
        ToolTableBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tool names, sorted.
    pub fn names(&self) -> Vec<&ToolName> {
        let mut names: Vec<&ToolName> = self.entries.keys().collect();
        names.sort();
        names
    }

    /// Declarations visible to `agent`: its bound tools followed by its
    /// callable agents, in declaration order. Names missing from the table
    /// are skipped.
    pub fn specs_for(&self, agent: &AgentSpec) -> Vec<ToolSpec> {
        let tools = agent.tools.iter().map(ToolName::as_str);
        let agents = agent.callable_agents.iter().map(AgentName::as_str);
        tools
            .chain(agents)
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.spec.clone())
            .collect()
    }

    /// Resolve a call made by `agent`.
    ///
    /// An agent may only reach tools it is bound to and agents it lists as
    /// callable; anything else is reported as not available, exactly like a
    /// name that does not exist.
    pub fn resolve_for(&self, agent: &AgentSpec, name: &str) -> Result<&ToolEntry, FailureReason> {
        let not_available = || FailureReason::NotFound {
            tool: name.to_string(),
        };
        let entry = self.entries.get(name).ok_or_else(not_available)?;
        let permitted = match &entry.kind {
            ToolKind::Agent(_) => agent.can_call(name),
            ToolKind::Local(_) | ToolKind::Remote { .. } => agent.allows_tool(name),
        };
        if permitted { Ok(entry) } else { Err(not_available()) }
    }
}

/// Builder for [`ToolTable`].
///
/// Precedence when names collide: local tools, then agents, then remote
/// tools in server registration order. The first registration of a name
/// wins; later ones are dropped with a log line.
#[derive(Default)]
pub struct ToolTableBuilder {
    entries: HashMap<ToolName, ToolEntry>,
}

impl ToolTableBuilder {
    /// Add an in-process tool.
    pub fn local(mut self, tool: Arc<dyn LocalTool>) -> Result<Self, NameError> {
        let name = ToolName::parse(tool.name())?;
        let spec = ToolSpec::new(name.clone(), tool.description()).with_parameters(tool.parameters());
        self.insert(name, ToolEntry {
            spec,
            kind: ToolKind::Local(tool),
        });
        Ok(self)
    }

    /// Expose an agent as a tool taking a single `input` string.
    pub fn agent(mut self, agent: &AgentSpec) -> Self {
        let name = ToolName::from(&agent.name);
        let spec = ToolSpec::new(name.clone(), agent.description.clone()).with_parameters(json!({
            "type": "object",
            "properties": { "input": { "type": "string" } },
            "required": ["input"]
        }));
        self.insert(name, ToolEntry {
            spec,
            kind: ToolKind::Agent(agent.name.clone()),
        });
        self
    }

    /// Add a tool advertised by a capability server.
    pub fn remote(mut self, tool: RemoteTool) -> Self {
        let name = tool.spec.name.clone();
        self.insert(name, ToolEntry {
            spec: tool.spec,
            kind: ToolKind::Remote {
                server: tool.server,
            },
        });
        self
    }

    fn insert(&mut self, name: ToolName, entry: ToolEntry) {
        if let Some(existing) = self.entries.get(&name) {
            match (&existing.kind, &entry.kind) {
                (ToolKind::Remote { server: first }, ToolKind::Remote { server: second }) => {
                    warn!(
                        tool = %name,
                        kept = %first,
                        dropped = %second,
                        "Duplicate remote tool name, keeping first server"
                    );
                }
                (kept, dropped) => {
                    debug!(
                        tool = %name,
                        kept = kept.label(),
                        dropped = dropped.label(),
                        "Tool name shadowed"
                    );
                }
            }
            return;
        }
        self.entries.insert(name, entry);
    }

    pub fn build(self) -> ToolTable {
        debug!(tools = self.entries.len(), "Built tool table");
        ToolTable {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standard::{AddTool, EchoTool};

    fn remote(server: &str, name: &str) -> RemoteTool {
        RemoteTool {
            server: server.to_string(),
            spec: ToolSpec::new(ToolName::new_unchecked(name), format!("{name} from {server}")),
        }
    }

    fn agent(name: &str) -> AgentSpec {
        AgentSpec::new(AgentName::new_unchecked(name))
    }

    #[test]
    fn test_local_shadows_remote() {
        let table = ToolTable::builder()
            .local(Arc::new(EchoTool::new()))
            .unwrap()
            .remote(remote("srv", "echo"))
            .build();
        assert!(matches!(table.get("echo").unwrap().kind, ToolKind::Local(_)));
    }

    #[test]
    fn test_first_remote_server_wins() {
        let table = ToolTable::builder()
            .remote(remote("first", "search"))
            .remote(remote("second", "search"))
            .build();
        match &table.get("search").unwrap().kind {
            ToolKind::Remote { server } => assert_eq!(server, "first"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_resolve_respects_bindings() {
        let adder = agent("Adder");
        let table = ToolTable::builder()
            .local(Arc::new(AddTool::new()))
            .unwrap()
            .local(Arc::new(EchoTool::new()))
            .unwrap()
            .agent(&adder)
            .build();

        let caller = agent("Caller")
            .with_tool(ToolName::new_unchecked("add"))
            .with_callable_agent(AgentName::new_unchecked("Adder"));

        assert!(table.resolve_for(&caller, "add").is_ok());
        assert!(table.resolve_for(&caller, "Adder").is_ok());
        assert_eq!(
            table.resolve_for(&caller, "echo").unwrap_err(),
            FailureReason::NotFound {
                tool: "echo".to_string()
            }
        );
        assert!(table.resolve_for(&caller, "missing").is_err());
    }

    #[test]
    fn test_specs_for_follow_declaration_order() {
        let table = ToolTable::builder()
            .local(Arc::new(AddTool::new()))
            .unwrap()
            .local(Arc::new(EchoTool::new()))
            .unwrap()
            .agent(&agent("Helper"))
            .build();
        let caller = agent("Caller")
            .with_tool(ToolName::new_unchecked("echo"))
            .with_tool(ToolName::new_unchecked("add"))
            .with_callable_agent(AgentName::new_unchecked("Helper"));

        let names: Vec<String> = table
            .specs_for(&caller)
            .into_iter()
            .map(|spec| spec.name.to_string())
            .collect();
        assert_eq!(names, vec!["echo", "add", "Helper"]);
    }

    #[test]
    fn test_invalid_local_name_is_rejected() {
        let tool = crate::FunctionTool::sync("bad name", "", |_| Ok("x".into()));
        assert!(ToolTable::builder().local(Arc::new(tool)).is_err());
    }
}

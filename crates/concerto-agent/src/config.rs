//! Configuration documents.
//!
//! Agents, flows, runtime settings and the default target can be declared in
//! a YAML (or JSON) document:
//!
//! ```yaml
//! runtime:
//!   max_call_depth: 4
//!   model_timeout: 60s
//! default: { agent: Greeter }
//! agents:
//!   - name: Greeter
//!     description: Greets
//!     tools: [echo]
//! flows:
//!   - flow:
//!       name: demo
//!       steps:
//!         - { type: agent, name: Greeter }
//!         - type: pattern
//!           pattern_type: parallel
//!           tasks: [ { name: a, type: agent, agent: Greeter } ]
//! ```
//!
//! Tools, capability servers, the model binding and the memory store are not
//! part of the document; they are registered on the builder in code.

use std::path::Path;

use concerto_core::agent::AgentSpec;
use concerto_core::collections::NonEmptyVec;
use concerto_core::error::{ConfigError, ConfigResult};
use concerto_core::identifiers::{AgentName, FlowName};
use concerto_core::pattern::{Flow, ParallelTask, Pattern, PatternKind, Step, StepRef, Termination};
use serde::Deserialize;
use tracing::debug;

use crate::app::{ApplicationBuilder, DefaultTarget};
use crate::settings::RuntimeSettings;

/// A parsed configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub default: Option<DefaultDocument>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub flows: Vec<FlowEntry>,
}

/// The `default` entry: `{ agent: <name> }` or `{ flow: <name> }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultDocument {
    #[serde(default)]
    pub agent: Option<AgentName>,
    #[serde(default)]
    pub flow: Option<FlowName>,
}

impl DefaultDocument {
    pub fn to_target(&self) -> ConfigResult<DefaultTarget> {
        match (&self.agent, &self.flow) {
            (Some(agent), None) => Ok(DefaultTarget::Agent(agent.clone())),
            (None, Some(flow)) => Ok(DefaultTarget::Flow(flow.clone())),
            _ => Err(ConfigError::Parse {
                message: "default: exactly one of 'agent' or 'flow' must be set".to_string(),
            }),
        }
    }
}

/// One entry of the `flows` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowEntry {
    pub flow: FlowDocument,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDocument {
    pub name: FlowName,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepDocument>,
}

/// A step as written in a document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDocument {
    Agent {
        name: AgentName,
        #[serde(default)]
        best_effort: bool,
    },
    Flow {
        name: FlowName,
        #[serde(default)]
        best_effort: bool,
    },
    Pattern(PatternDocument),
}

/// The target of a parallel task, tagged like a step but keyed by kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskTargetDocument {
    Agent { agent: AgentName },
    Flow { flow: FlowName },
    Pattern(PatternDocument),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDocument {
    pub name: String,
    #[serde(flatten)]
    pub target: TaskTargetDocument,
}

/// `termination: max_rounds` or `termination: { consensus: <marker> }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TerminationDocument {
    Named(String),
    Consensus { consensus: String },
}

/// An inline pattern. Which fields are required depends on `pattern_type`;
/// fields belonging to another pattern type are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternDocument {
    pub pattern_type: PatternKind,
    #[serde(default)]
    pub best_effort: bool,
    // sequential
    #[serde(default)]
    pub steps: Option<Vec<StepDocument>>,
    // parallel
    #[serde(default)]
    pub tasks: Option<Vec<TaskDocument>>,
    #[serde(default)]
    pub synthesis: Option<Box<StepDocument>>,
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    // router
    #[serde(default)]
    pub discriminator: Option<Box<StepDocument>>,
    #[serde(default)]
    pub candidates: Option<Vec<StepDocument>>,
    #[serde(default)]
    pub fallback: Option<Box<StepDocument>>,
    // discussion
    #[serde(default)]
    pub participants: Option<Vec<AgentName>>,
    #[serde(default)]
    pub moderator: Option<AgentName>,
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub termination: Option<TerminationDocument>,
}

impl ConfigDocument {
    /// Parse a YAML document. JSON documents parse as well.
    pub fn from_yaml_str(source: &str) -> ConfigResult<Self> {
        let doc: Self = serde_yaml::from_str(source).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        doc.checked()
    }

    pub fn from_json_str(source: &str) -> ConfigResult<Self> {
        let doc: Self = serde_json::from_str(source).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        doc.checked()
    }

    fn checked(self) -> ConfigResult<Self> {
        self.default_target()?;
        Ok(self)
    }

    /// The declared default agent or flow, if any.
    pub fn default_target(&self) -> ConfigResult<Option<DefaultTarget>> {
        self.default.as_ref().map(DefaultDocument::to_target).transpose()
    }

    /// Read a document from disk; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = ?path, bytes = source.len(), "Loaded configuration document");
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    /// Convert the declared flows into pattern trees.
    pub fn flows(&self) -> ConfigResult<Vec<Flow>> {
        self.flows.iter().map(|entry| entry.flow.to_flow()).collect()
    }

    /// Register everything the document declares on `builder`.
    pub fn apply(self, builder: ApplicationBuilder) -> ConfigResult<ApplicationBuilder> {
        let flows = self.flows()?;
        let default = self.default_target()?;
        let mut builder = builder.settings(self.runtime).agents(self.agents).flows(flows);
        if let Some(target) = default {
            builder = builder.default_target(target);
        }
        Ok(builder)
    }
}

impl FlowDocument {
    fn to_flow(&self) -> ConfigResult<Flow> {
        let location = format!("flow '{}'", self.name);
        let pattern = match self.steps.as_slice() {
            [] => {
                return Err(ConfigError::invalid_pattern(
                    PatternKind::Sequential.to_string(),
                    location,
                    "a flow needs at least one step",
                ));
            }
            [StepDocument::Pattern(single)] => single.to_pattern(&location)?,
            steps => sequential(steps, &location)?,
        };
        Ok(Flow::new(self.name.clone(), pattern).with_description(self.description.clone()))
    }
}

impl StepDocument {
    fn to_step(&self, location: &str) -> ConfigResult<Step> {
        let (target, best_effort) = match self {
            StepDocument::Agent { name, best_effort } => (StepRef::agent(name.clone()), *best_effort),
            StepDocument::Flow { name, best_effort } => (StepRef::flow(name.clone()), *best_effort),
            StepDocument::Pattern(pattern) => (StepRef::inline(pattern.to_pattern(location)?), pattern.best_effort),
        };
        Ok(Step { target, best_effort })
    }

    fn to_ref(&self, location: &str) -> ConfigResult<StepRef> {
        self.to_step(location).map(|step| step.target)
    }
}

impl TaskDocument {
    fn to_task(&self, location: &str) -> ConfigResult<ParallelTask> {
        let target = match &self.target {
            TaskTargetDocument::Agent { agent } => StepRef::agent(agent.clone()),
            TaskTargetDocument::Flow { flow } => StepRef::flow(flow.clone()),
            TaskTargetDocument::Pattern(pattern) => StepRef::inline(pattern.to_pattern(location)?),
        };
        Ok(ParallelTask::new(self.name.clone(), target))
    }
}

fn sequential(steps: &[StepDocument], location: &str) -> ConfigResult<Pattern> {
    let steps: Vec<Step> = steps
        .iter()
        .map(|step| step.to_step(location))
        .collect::<ConfigResult<_>>()?;
    let steps = NonEmptyVec::try_from(steps).map_err(|_| {
        ConfigError::invalid_pattern(PatternKind::Sequential.to_string(), location, "steps must not be empty")
    })?;
    Ok(Pattern::Sequential { steps })
}

impl PatternDocument {
    /// The first field that is set but belongs to another pattern type.
    fn stray_field(&self) -> Option<&'static str> {
        let fields = [
            ("steps", self.steps.is_some(), PatternKind::Sequential),
            ("tasks", self.tasks.is_some(), PatternKind::Parallel),
            ("synthesis", self.synthesis.is_some(), PatternKind::Parallel),
            ("max_in_flight", self.max_in_flight.is_some(), PatternKind::Parallel),
            ("discriminator", self.discriminator.is_some(), PatternKind::Router),
            ("candidates", self.candidates.is_some(), PatternKind::Router),
            ("fallback", self.fallback.is_some(), PatternKind::Router),
            ("participants", self.participants.is_some(), PatternKind::Discussion),
            ("moderator", self.moderator.is_some(), PatternKind::Discussion),
            ("max_rounds", self.max_rounds.is_some(), PatternKind::Discussion),
            ("termination", self.termination.is_some(), PatternKind::Discussion),
        ];
        fields
            .into_iter()
            .find(|(_, set, owner)| *set && *owner != self.pattern_type)
            .map(|(field, _, _)| field)
    }

    fn to_pattern(&self, location: &str) -> ConfigResult<Pattern> {
        let kind = self.pattern_type;
        if let Some(field) = self.stray_field() {
            return Err(ConfigError::invalid_pattern(
                kind.to_string(),
                location,
                format!("field '{}' does not apply to a {} pattern", field, kind),
            ));
        }
        let missing = |field: &str| {
            ConfigError::invalid_pattern(kind.to_string(), location, format!("missing field '{}'", field))
        };
        let empty = |field: &str| {
            ConfigError::invalid_pattern(kind.to_string(), location, format!("'{}' must not be empty", field))
        };

        match kind {
            PatternKind::Sequential => {
                let steps = self.steps.as_ref().ok_or_else(|| missing("steps"))?;
                sequential(steps, location)
            }
            PatternKind::Parallel => {
                let tasks: Vec<ParallelTask> = self
                    .tasks
                    .as_ref()
                    .ok_or_else(|| missing("tasks"))?
                    .iter()
                    .map(|task| task.to_task(location))
                    .collect::<ConfigResult<_>>()?;
                let tasks = NonEmptyVec::try_from(tasks).map_err(|_| empty("tasks"))?;
                let synthesis = self
                    .synthesis
                    .as_ref()
                    .map(|step| step.to_ref(location))
                    .transpose()?;
                Ok(Pattern::Parallel {
                    tasks,
                    synthesis,
                    max_in_flight: self.max_in_flight,
                })
            }
            PatternKind::Router => {
                let discriminator = self
                    .discriminator
                    .as_ref()
                    .ok_or_else(|| missing("discriminator"))?
                    .to_ref(location)?;
                let candidates: Vec<StepRef> = self
                    .candidates
                    .as_ref()
                    .ok_or_else(|| missing("candidates"))?
                    .iter()
                    .map(|step| step.to_ref(location))
                    .collect::<ConfigResult<_>>()?;
                let candidates = NonEmptyVec::try_from(candidates).map_err(|_| empty("candidates"))?;
                let fallback = self
                    .fallback
                    .as_ref()
                    .ok_or_else(|| missing("fallback"))?
                    .to_ref(location)?;
                Ok(Pattern::router(discriminator, candidates, fallback))
            }
            PatternKind::Discussion => {
                let participants = self
                    .participants
                    .clone()
                    .ok_or_else(|| missing("participants"))?;
                let participants = NonEmptyVec::try_from(participants).map_err(|_| empty("participants"))?;
                let termination = match &self.termination {
                    None => Termination::MaxRounds,
                    Some(TerminationDocument::Named(name)) if name == "max_rounds" => Termination::MaxRounds,
                    Some(TerminationDocument::Named(other)) => {
                        return Err(ConfigError::invalid_pattern(
                            kind.to_string(),
                            location,
                            format!("unknown termination '{}'", other),
                        ));
                    }
                    Some(TerminationDocument::Consensus { consensus }) => Termination::Consensus {
                        marker: consensus.clone(),
                    },
                };
                Ok(Pattern::Discussion {
                    participants,
                    moderator: self.moderator.clone(),
                    max_rounds: self.max_rounds.ok_or_else(|| missing("max_rounds"))?,
                    termination,
                })
            }
        }
    }
}

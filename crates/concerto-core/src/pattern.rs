//! Composition patterns and flows.
//!
//! A [`Pattern`] is a closed tree: every leaf is a [`StepRef`] naming a
//! registered agent or flow, and inner nodes are inline patterns. Lists that
//! must not be empty are held as [`NonEmptyVec`] so an empty pipeline cannot
//! be constructed.

use crate::collections::NonEmptyVec;
use crate::identifiers::{AgentName, FlowName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target of a step: an agent, a registered flow, or an inline pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepRef {
    Agent { name: AgentName },
    Flow { name: FlowName },
    Pattern { pattern: Box<Pattern> },
}

impl StepRef {
    pub fn agent(name: AgentName) -> Self {
        StepRef::Agent { name }
    }

    pub fn flow(name: FlowName) -> Self {
        StepRef::Flow { name }
    }

    pub fn inline(pattern: Pattern) -> Self {
        StepRef::Pattern {
            pattern: Box::new(pattern),
        }
    }

    /// Name of the referenced agent or flow; `None` for inline patterns.
    pub fn name(&self) -> Option<&str> {
        match self {
            StepRef::Agent { name } => Some(name.as_str()),
            StepRef::Flow { name } => Some(name.as_str()),
            StepRef::Pattern { .. } => None,
        }
    }

    /// Label used in logs and error chains.
    pub fn label(&self) -> String {
        match self {
            StepRef::Agent { name } => name.to_string(),
            StepRef::Flow { name } => format!("flow:{}", name),
            StepRef::Pattern { pattern } => format!("<{}>", pattern.kind()),
        }
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One step of a sequential pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub target: StepRef,
    /// A failing best-effort step is skipped instead of aborting the pipeline
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub best_effort: bool,
}

impl Step {
    pub fn new(target: StepRef) -> Self {
        Self {
            target,
            best_effort: false,
        }
    }

    pub fn best_effort(target: StepRef) -> Self {
        Self {
            target,
            best_effort: true,
        }
    }
}

impl From<StepRef> for Step {
    fn from(target: StepRef) -> Self {
        Step::new(target)
    }
}

/// Named branch of a parallel fan-out. The name keys the result entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelTask {
    pub name: String,
    pub target: StepRef,
}

impl ParallelTask {
    pub fn new(name: impl Into<String>, target: StepRef) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// When a discussion stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Run exactly `max_rounds` rounds
    MaxRounds,
    /// Stop early once the moderator's verdict contains `marker`
    Consensus { marker: String },
}

/// Pattern kind without its payload; used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Sequential,
    Parallel,
    Router,
    Discussion,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternKind::Sequential => "sequential",
            PatternKind::Parallel => "parallel",
            PatternKind::Router => "router",
            PatternKind::Discussion => "discussion",
        };
        f.write_str(s)
    }
}

/// A composition of steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "pattern_type", rename_all = "snake_case")]
pub enum Pattern {
    Sequential {
        steps: NonEmptyVec<Step>,
    },
    Parallel {
        tasks: NonEmptyVec<ParallelTask>,
        #[serde(skip_serializing_if = "Option::is_none")]
        synthesis: Option<StepRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_in_flight: Option<usize>,
    },
    Router {
        discriminator: StepRef,
        candidates: NonEmptyVec<StepRef>,
        fallback: StepRef,
    },
    Discussion {
        participants: NonEmptyVec<AgentName>,
        #[serde(skip_serializing_if = "Option::is_none")]
        moderator: Option<AgentName>,
        max_rounds: u32,
        termination: Termination,
    },
}

impl Pattern {
    pub fn kind(&self) -> PatternKind {
        match self {
            Pattern::Sequential { .. } => PatternKind::Sequential,
            Pattern::Parallel { .. } => PatternKind::Parallel,
            Pattern::Router { .. } => PatternKind::Router,
            Pattern::Discussion { .. } => PatternKind::Discussion,
        }
    }

    /// A pipeline of plain (fail-fast) steps.
    pub fn sequential(steps: NonEmptyVec<StepRef>) -> Self {
        Pattern::Sequential {
            steps: steps.map(Step::new),
        }
    }

    pub fn parallel(tasks: NonEmptyVec<ParallelTask>) -> Self {
        Pattern::Parallel {
            tasks,
            synthesis: None,
            max_in_flight: None,
        }
    }

    pub fn router(discriminator: StepRef, candidates: NonEmptyVec<StepRef>, fallback: StepRef) -> Self {
        Pattern::Router {
            discriminator,
            candidates,
            fallback,
        }
    }

    pub fn discussion(participants: NonEmptyVec<AgentName>, max_rounds: u32) -> Self {
        Pattern::Discussion {
            participants,
            moderator: None,
            max_rounds,
            termination: Termination::MaxRounds,
        }
    }

    /// Visit every step reference in the tree, depth first.
    pub fn for_each_ref<'a>(&'a self, visit: &mut dyn FnMut(&'a StepRef)) {
        let mut direct = Vec::new();
        self.direct_refs(&mut direct);
        for step in direct {
            visit(step);
            if let StepRef::Pattern { pattern } = step {
                pattern.for_each_ref(visit);
            }
        }
    }

    /// Agent names referenced anywhere in the tree, including discussion
    /// participants and moderators.
    pub fn referenced_agents(&self) -> Vec<&AgentName> {
        let mut agents = Vec::new();
        self.collect_agents(&mut agents);
        agents
    }

    fn collect_agents<'a>(&'a self, out: &mut Vec<&'a AgentName>) {
        match self {
            Pattern::Discussion {
                participants,
                moderator,
                ..
            } => {
                out.extend(participants.iter());
                out.extend(moderator.iter());
            }
            _ => {
                let mut direct: Vec<&'a StepRef> = Vec::new();
                self.direct_refs(&mut direct);
                for step in direct {
                    match step {
                        StepRef::Agent { name } => out.push(name),
                        StepRef::Pattern { pattern } => pattern.collect_agents(out),
                        StepRef::Flow { .. } => {}
                    }
                }
            }
        }
    }

    fn direct_refs<'a>(&'a self, out: &mut Vec<&'a StepRef>) {
        match self {
            Pattern::Sequential { steps } => out.extend(steps.iter().map(|s| &s.target)),
            Pattern::Parallel {
                tasks, synthesis, ..
            } => {
                out.extend(tasks.iter().map(|t| &t.target));
                out.extend(synthesis.iter());
            }
            Pattern::Router {
                discriminator,
                candidates,
                fallback,
            } => {
                out.push(discriminator);
                out.extend(candidates.iter());
                out.push(fallback);
            }
            Pattern::Discussion { .. } => {}
        }
    }

    /// Flow names referenced anywhere in the tree.
    pub fn referenced_flows(&self) -> Vec<&FlowName> {
        let mut flows = Vec::new();
        self.for_each_ref(&mut |step| {
            if let StepRef::Flow { name } = step {
                flows.push(name);
            }
        });
        flows
    }
}

/// A named, registered pattern tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flow {
    pub name: FlowName,
    pub description: String,
    pub pattern: Pattern,
}

impl Flow {
    pub fn new(name: FlowName, pattern: Pattern) -> Self {
        Self {
            name,
            description: String::new(),
            pattern,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

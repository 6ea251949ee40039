use std::sync::Arc;

use concerto_core::message::Message;
use concerto_core::pattern::{ParallelTask, PatternKind, StepRef};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RuntimeContext;
use crate::error::{FlowError, FlowResult};

/// Outcome of one parallel task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Output(String),
    Error(String),
}

impl TaskOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, TaskOutcome::Error(_))
    }
}

impl Serialize for TaskOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            TaskOutcome::Output(text) => map.serialize_entry("output", text)?,
            TaskOutcome::Error(text) => map.serialize_entry("error", text)?,
        }
        map.end()
    }
}

/// Task outcomes keyed by task name, in configured task order.
///
/// Serializes as a JSON object whose keys keep that order:
/// `{"a": {"output": "..."}, "b": {"error": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResults {
    entries: Vec<(String, TaskOutcome)>,
}

impl TaskResults {
    pub fn get(&self, task: &str) -> Option<&TaskOutcome> {
        self.entries.iter().find(|(name, _)| name == task).map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskOutcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|(_, outcome)| outcome.is_error()).count()
    }

    /// Plain-text digest handed to a synthesis step.
    pub fn summary(&self, request: &str) -> String {
        let mut text = format!("Original request:\n{}\n\nResults:", request);
        for (name, outcome) in &self.entries {
            match outcome {
                TaskOutcome::Output(output) => text.push_str(&format!("\n\n## {}\n{}", name, output)),
                TaskOutcome::Error(error) => text.push_str(&format!("\n\n## {}\nERROR: {}", name, error)),
            }
        }
        text
    }

    /// Serialized JSON object of all entries.
    pub fn to_json_string(&self) -> String {
        // Keys are strings and values are strings, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for TaskResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, outcome) in &self.entries {
            map.serialize_entry(name, outcome)?;
        }
        map.end()
    }
}

/// Fan out to every task concurrently, at most `limit` at a time.
///
/// A failing task becomes an error entry; only when every task fails is the
/// pattern itself an error. Cancellation aborts all tasks still running.
pub(super) async fn run(
    ctx: &RuntimeContext,
    tasks: &[ParallelTask],
    synthesis: Option<&StepRef>,
    limit: Option<usize>,
    input: Message,
    cancel: &CancellationToken,
) -> FlowResult<Message> {
    let semaphore = limit.map(|n| Arc::new(Semaphore::new(n)));
    info!(tasks = tasks.len(), max_in_flight = ?limit, "Starting parallel fan-out");

    // Dropping the set (early return or cancellation of this future) aborts
    // every task still running.
    let mut set = JoinSet::new();
    for (idx, task) in tasks.iter().enumerate() {
        let ctx = ctx.clone();
        let target = task.target.clone();
        let input = input.as_input();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return (idx, Err(FlowError::Cancelled)),
                },
                None => None,
            };
            (idx, ctx.run_target(&target, input, &cancel).await)
        });
    }

    let mut slots: Vec<Option<FlowResult<Message>>> = (0..tasks.len()).map(|_| None).collect();
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                set.abort_all();
                return Err(FlowError::Cancelled);
            }
            joined = set.join_next() => joined,
        };
        match joined {
            None => break,
            Some(Ok((idx, result))) => {
                debug!(task = %tasks[idx].name, ok = result.is_ok(), "Parallel task finished");
                slots[idx] = Some(result);
            }
            Some(Err(join)) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Some(Err(_)) => return Err(FlowError::Cancelled),
        }
    }

    let mut results = TaskResults::default();
    let mut failures = Vec::new();
    for (task, slot) in tasks.iter().zip(slots) {
        let outcome = match slot {
            Some(Ok(message)) => TaskOutcome::Output(message.into_content()),
            Some(Err(FlowError::Cancelled)) | None => return Err(FlowError::Cancelled),
            Some(Err(e)) => {
                warn!(task = %task.name, error = %e, "Parallel task failed");
                failures.push((task.name.clone(), e.to_string()));
                TaskOutcome::Error(e.to_string())
            }
        };
        results.entries.push((task.name.clone(), outcome));
    }

    if failures.len() == results.len() {
        return Err(FlowError::AllTasksFailed {
            pattern: PatternKind::Parallel,
            failures,
        });
    }
    info!(
        tasks = results.len(),
        failed = results.failed(),
        "Parallel fan-out completed"
    );

    match synthesis {
        Some(step) => {
            let digest = Message::user(results.summary(input.content()));
            ctx.run_target(step, digest, cancel)
                .await
                .map_err(|e| FlowError::step(PatternKind::Parallel, step.label(), e))
        }
        None => Ok(Message::assistant(results.to_json_string())
            .with_metadata("pattern", json!("parallel"))
            .with_metadata("failed_tasks", json!(results.failed()))),
    }
}

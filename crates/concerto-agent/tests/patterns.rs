//! Pattern engine behaviour across sequential, parallel, router and
//! discussion compositions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use concerto_agent::{Application, FlowError, ModelError, RuntimeContext, RuntimeSettings};
use concerto_core::agent::AgentSpec;
use concerto_core::error::ToolResult;
use concerto_core::identifiers::{AgentName, FlowName, SessionId, ToolName};
use concerto_core::message::Role;
use concerto_core::pattern::{Flow, ParallelTask, Pattern, PatternKind, Step, StepRef, Termination};
use concerto_core::tool::ToolOutput;
use concerto_core::NonEmptyVec;
use concerto_testing::{ScriptedModel, last_text};
use concerto_tools::LocalTool;
use serde_json::{Value, json};

fn agent(name: &str) -> AgentSpec {
    AgentSpec::new(AgentName::new_unchecked(name))
}

fn agent_ref(name: &str) -> StepRef {
    StepRef::agent(AgentName::new_unchecked(name))
}

fn agents(names: &[&str]) -> Vec<AgentSpec> {
    names.iter().map(|n| agent(n)).collect()
}

fn flow(name: &str, pattern: Pattern) -> Flow {
    Flow::new(FlowName::new_unchecked(name), pattern)
}

fn non_empty<T: Clone>(items: Vec<T>) -> NonEmptyVec<T> {
    NonEmptyVec::try_from(items).unwrap()
}

fn parallel(tasks: &[(&str, &str)], synthesis: Option<&str>, max_in_flight: Option<usize>) -> Pattern {
    Pattern::Parallel {
        tasks: non_empty(
            tasks
                .iter()
                .map(|(name, agent)| ParallelTask::new(*name, agent_ref(agent)))
                .collect(),
        ),
        synthesis: synthesis.map(agent_ref),
        max_in_flight,
    }
}

async fn run(app: &Arc<Application>, flow: &str, input: &str) -> Result<concerto_core::Message, FlowError> {
    let flow = flow.to_string();
    let input = input.to_string();
    RuntimeContext::scope(app.clone(), SessionId::generate(), |ctx| async move {
        ctx.run_flow(&flow, input).await
    })
    .await
}

#[tokio::test]
async fn test_sequential_feeds_each_output_forward() {
    let model = Arc::new(ScriptedModel::new().echo_fallback());
    let steps = non_empty(vec![agent_ref("A"), agent_ref("B"), agent_ref("C")]);
    let app = Application::builder(model.clone())
        .agents(agents(&["A", "B", "C"]))
        .flow(flow("pipeline", Pattern::sequential(steps)))
        .build()
        .unwrap();

    let answer = run(&app, "pipeline", "x").await.unwrap();
    assert_eq!(answer.content(), "C: B: A: x");

    let order: Vec<String> = model.requests().iter().map(|r| r.agent.to_string()).collect();
    assert_eq!(order, vec!["A", "B", "C"]);
    // Every step receives its input as a user message.
    assert_eq!(last_text(&model.requests_for("C")[0]), "B: A: x");
}

#[tokio::test]
async fn test_sequential_fails_fast_with_step_path() {
    let model = Arc::new(
        ScriptedModel::new()
            .fail("B", ModelError::InvalidRequest("rejected".into()))
            .echo_fallback(),
    );
    let inner = Pattern::sequential(non_empty(vec![agent_ref("A"), agent_ref("B")]));
    let outer = Pattern::sequential(non_empty(vec![StepRef::flow(FlowName::new_unchecked("inner")), agent_ref("C")]));
    let app = Application::builder(model.clone())
        .agents(agents(&["A", "B", "C"]))
        .flow(flow("inner", inner))
        .flow(flow("outer", outer))
        .build()
        .unwrap();

    let err = run(&app, "outer", "x").await.unwrap_err();
    assert_eq!(err.step_path(), vec!["flow:inner", "B"]);
    assert!(matches!(err.root_cause(), FlowError::ModelCall { .. }));
    assert_eq!(err.error_code(), "MODEL_CALL_FAILED");
    assert_eq!(model.calls_for("C"), 0);
}

#[tokio::test]
async fn test_best_effort_step_passes_input_through() {
    let model = Arc::new(
        ScriptedModel::new()
            .fail("Flaky", ModelError::InvalidRequest("nope".into()))
            .echo_fallback(),
    );
    let pattern = Pattern::Sequential {
        steps: non_empty(vec![Step::best_effort(agent_ref("Flaky")), Step::new(agent_ref("B"))]),
    };
    let app = Application::builder(model)
        .agents(agents(&["Flaky", "B"]))
        .flow(flow("tolerant", pattern))
        .build()
        .unwrap();

    assert_eq!(run(&app, "tolerant", "x").await.unwrap().content(), "B: x");
}

#[tokio::test]
async fn test_parallel_keeps_declaration_order() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_latency("Zed", Duration::from_millis(60))
            .with_latency("Mid", Duration::from_millis(30))
            .echo_fallback(),
    );
    let app = Application::builder(model)
        .agents(agents(&["Zed", "Mid", "Alpha"]))
        .flow(flow("fan", parallel(&[("z", "Zed"), ("m", "Mid"), ("a", "Alpha")], None, None)))
        .build()
        .unwrap();

    let answer = run(&app, "fan", "q").await.unwrap();
    let text = answer.content();
    let z = text.find("\"z\"").unwrap();
    let m = text.find("\"m\"").unwrap();
    let a = text.find("\"a\"").unwrap();
    assert!(z < m && m < a, "{text}");

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed["z"], json!({"output": "Zed: q"}));
    assert_eq!(answer.metadata_value("failed_tasks"), Some(&json!(0)));
}

#[tokio::test]
async fn test_parallel_isolates_failures() {
    let model = Arc::new(
        ScriptedModel::new()
            .fail("Broken", ModelError::InvalidRequest("bad".into()))
            .echo_fallback(),
    );
    let app = Application::builder(model)
        .agents(agents(&["Broken", "Fine"]))
        .flow(flow("fan", parallel(&[("broken", "Broken"), ("fine", "Fine")], None, None)))
        .build()
        .unwrap();

    let answer = run(&app, "fan", "q").await.unwrap();
    let parsed: Value = serde_json::from_str(answer.content()).unwrap();
    assert!(parsed["broken"]["error"].as_str().unwrap().contains("Broken"));
    assert_eq!(parsed["fine"]["output"], "Fine: q");
    assert_eq!(answer.metadata_value("failed_tasks"), Some(&json!(1)));
}

#[tokio::test]
async fn test_parallel_all_failed_is_an_error() {
    let model = Arc::new(
        ScriptedModel::new()
            .fail("One", ModelError::InvalidRequest("x".into()))
            .fail("Two", ModelError::InvalidRequest("y".into())),
    );
    let app = Application::builder(model)
        .agents(agents(&["One", "Two"]))
        .flow(flow("fan", parallel(&[("one", "One"), ("two", "Two")], None, None)))
        .build()
        .unwrap();

    match run(&app, "fan", "q").await.unwrap_err() {
        FlowError::AllTasksFailed { pattern, failures } => {
            assert_eq!(pattern, PatternKind::Parallel);
            let names: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
            assert_eq!(names, vec!["one", "two"]);
        }
        other => panic!("expected all tasks failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_parallel_synthesis_sees_request_and_results() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply("Summarizer", "combined")
            .echo_fallback(),
    );
    let app = Application::builder(model.clone())
        .agents(agents(&["Left", "Right", "Summarizer"]))
        .flow(flow("fan", parallel(&[("left", "Left"), ("right", "Right")], Some("Summarizer"), None)))
        .build()
        .unwrap();

    assert_eq!(run(&app, "fan", "topic").await.unwrap().content(), "combined");
    let digest = last_text(&model.requests_for("Summarizer")[0]).to_string();
    assert!(digest.starts_with("Original request:\ntopic"));
    assert!(digest.contains("## left\nLeft: topic"));
    assert!(digest.contains("## right\nRight: topic"));
}

/// Tracks how many calls are running at once.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct GaugeTool(Arc<Gauge>);

#[async_trait]
impl LocalTool for GaugeTool {
    fn name(&self) -> &str {
        "gauge"
    }

    fn description(&self) -> &str {
        "Holds a slot for a moment"
    }

    async fn call(&self, _arguments: Value) -> ToolResult<ToolOutput> {
        let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.0.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ToolOutput::Text("ok".into()))
    }
}

#[tokio::test]
async fn test_parallel_respects_in_flight_limit() {
    let gauge = Arc::new(Gauge::default());
    let names = ["W1", "W2", "W3", "W4", "W5"];
    let mut model = ScriptedModel::new();
    for name in names {
        model = model.call_tool(name, "gauge", json!({})).reply(name, "done");
    }
    let tasks: Vec<(&str, &str)> = names.iter().map(|n| (*n, *n)).collect();
    let app = Application::builder(Arc::new(model))
        .settings(RuntimeSettings::default().with_max_in_flight(Some(4)))
        .tool(Arc::new(GaugeTool(gauge.clone())))
        .agents(
            names
                .iter()
                .map(|n| agent(n).with_tool(ToolName::new_unchecked("gauge"))),
        )
        // The pattern's own limit wins over the settings default.
        .flow(flow("fan", parallel(&tasks, None, Some(2))))
        .build()
        .unwrap();

    run(&app, "fan", "go").await.unwrap();
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_closing_context_cancels_parallel_branches() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_latency("SlowA", Duration::from_secs(5))
            .with_latency("SlowB", Duration::from_secs(5))
            .echo_fallback(),
    );
    let app = Application::builder(model.clone())
        .agents(agents(&["SlowA", "SlowB"]))
        .flow(flow("fan", parallel(&[("a", "SlowA"), ("b", "SlowB")], None, None)))
        .build()
        .unwrap();

    let ctx = app.start().await.unwrap();
    let running = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.run_flow("fan", "go").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.close().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("fan-out stops promptly after close")
        .unwrap();
    assert!(matches!(result, Err(FlowError::Cancelled)), "{result:?}");
    assert_eq!(model.calls_for("SlowA"), 1);
    assert_eq!(model.calls_for("SlowB"), 1);

    let history = ctx.history(None).await.unwrap();
    assert!(history.iter().all(|m| m.role() != Role::Assistant), "{history:?}");
}

#[tokio::test]
async fn test_router_forwards_original_input() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply("Classifier", "  Billing\n")
            .echo_fallback(),
    );
    let router = Pattern::router(
        agent_ref("Classifier"),
        non_empty(vec![agent_ref("Billing"), agent_ref("Support")]),
        agent_ref("General"),
    );
    let app = Application::builder(model.clone())
        .agents(agents(&["Classifier", "Billing", "Support", "General"]))
        .flow(flow("desk", router))
        .build()
        .unwrap();

    let answer = run(&app, "desk", "my invoice is wrong").await.unwrap();
    assert_eq!(answer.content(), "Billing: my invoice is wrong");
    assert_eq!(model.calls_for("Support"), 0);
    assert_eq!(model.calls_for("General"), 0);
}

#[tokio::test]
async fn test_router_ambiguous_decision_uses_fallback() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply("Classifier", "Billing or Support")
            .echo_fallback(),
    );
    let router = Pattern::router(
        agent_ref("Classifier"),
        non_empty(vec![agent_ref("Billing"), agent_ref("Support")]),
        agent_ref("General"),
    );
    let app = Application::builder(model.clone())
        .agents(agents(&["Classifier", "Billing", "Support", "General"]))
        .flow(flow("desk", router))
        .build()
        .unwrap();

    let answer = run(&app, "desk", "hello").await.unwrap();
    assert_eq!(answer.content(), "General: hello");
    assert_eq!(model.calls_for("Classifier"), 1);
}

#[tokio::test]
async fn test_router_does_not_guess_from_prose() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply("Classifier", "This is definitely not Billing")
            .echo_fallback(),
    );
    let router = Pattern::router(
        agent_ref("Classifier"),
        non_empty(vec![agent_ref("Billing"), agent_ref("Support")]),
        agent_ref("General"),
    );
    let app = Application::builder(model.clone())
        .agents(agents(&["Classifier", "Billing", "Support", "General"]))
        .flow(flow("desk", router))
        .build()
        .unwrap();

    let answer = run(&app, "desk", "hello").await.unwrap();
    assert_eq!(answer.content(), "General: hello");
    assert_eq!(model.calls_for("Billing"), 0);
    assert_eq!(model.calls_for("General"), 1);
}

#[tokio::test]
async fn test_discussion_runs_all_rounds_without_moderator() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply("Critic", "too long")
            .reply("Author", "shortened")
            .reply("Critic", "better")
            .reply("Author", "thanks"),
    );
    let pattern = Pattern::discussion(
        non_empty(vec![AgentName::new_unchecked("Critic"), AgentName::new_unchecked("Author")]),
        2,
    );
    let app = Application::builder(model.clone())
        .agents(agents(&["Critic", "Author"]))
        .flow(flow("review", pattern))
        .build()
        .unwrap();

    let answer = run(&app, "review", "the draft").await.unwrap();
    assert_eq!(
        answer.content(),
        "[Critic] too long\n[Author] shortened\n[Critic] better\n[Author] thanks"
    );
    assert_eq!(answer.metadata_value("rounds"), Some(&json!(2)));
    assert_eq!(answer.metadata_value("consensus"), Some(&json!(false)));

    let first = last_text(&model.requests_for("Critic")[0]).to_string();
    assert!(first.contains("(no contributions yet)"));
    assert!(first.contains("Round 1 of 2. You are Critic."));
    let later = last_text(&model.requests_for("Author")[1]).to_string();
    assert!(later.contains("[Critic] better"));
}

#[tokio::test]
async fn test_discussion_stops_on_consensus() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply("Chair", "AGREED, both sides align")
            .reply("Chair", "They settled on option B")
            .echo_fallback(),
    );
    let pattern = Pattern::Discussion {
        participants: non_empty(vec![AgentName::new_unchecked("Pro"), AgentName::new_unchecked("Con")]),
        moderator: Some(AgentName::new_unchecked("Chair")),
        max_rounds: 5,
        termination: Termination::Consensus {
            marker: "AGREED".into(),
        },
    };
    let app = Application::builder(model.clone())
        .agents(agents(&["Pro", "Con", "Chair"]))
        .flow(flow("debate", pattern))
        .build()
        .unwrap();

    let answer = run(&app, "debate", "option A or B").await.unwrap();
    assert_eq!(answer.content(), "They settled on option B");
    assert_eq!(answer.author().map(AgentName::as_str), Some("Chair"));
    assert_eq!(answer.role(), Role::Assistant);
    assert_eq!(answer.metadata_value("rounds"), Some(&json!(1)));
    assert_eq!(answer.metadata_value("consensus"), Some(&json!(true)));
    assert_eq!(model.calls_for("Pro"), 1);
    assert_eq!(model.calls_for("Chair"), 2);
}

#[tokio::test]
async fn test_inline_pattern_inside_flow() {
    let model = Arc::new(ScriptedModel::new().echo_fallback());
    let fan = parallel(&[("x", "X"), ("y", "Y")], Some("Joiner"), None);
    let pipeline = Pattern::sequential(non_empty(vec![agent_ref("Prep"), StepRef::inline(fan)]));
    let app = Application::builder(model.clone())
        .agents(agents(&["Prep", "X", "Y", "Joiner"]))
        .flow(flow("nested", pipeline))
        .build()
        .unwrap();

    let answer = run(&app, "nested", "in").await.unwrap();
    assert!(answer.content().starts_with("Joiner: Original request:\nPrep: in"));
    assert_eq!(last_text(&model.requests_for("X")[0]), "Prep: in");
}

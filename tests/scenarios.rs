//! Integration Tests for End-to-End Scenarios
//!
//! These tests drive the public facade the way an application would: a
//! configured set of agents and flows, the standard tools, a scripted model
//! standing in for the provider, and the session log checked afterwards.

use std::sync::Arc;

use concerto::{
    Application, ConfigDocument, FileStore, MemoryStore, ModelResponse, NonEmptyVec, Pattern, Role,
    RuntimeContext, SessionId, StepRef,
};
use concerto_testing::{ScriptedModel, TestHarnessBuilder, TestScenario, last_text};
use serde_json::json;
use tempfile::TempDir;

fn step(name: &str) -> StepRef {
    StepRef::agent(concerto::AgentName::new_unchecked(name))
}

/// Greeter answers in prose, Echo routes its input through the `echo` tool,
/// Adder pulls two numbers out of its input and calls `add`.
fn pipeline_model() -> ScriptedModel {
    ScriptedModel::new()
        .respond_with("Greeter", |request| {
            Ok(ModelResponse::text(format!("Hello! You sent {}", last_text(request))))
        })
        .call_tool("Echo", "echo", json!({"text": "numbers 5,7"}))
        .reply("Echo", "numbers 5,7")
        .call_tool("Adder", "add", json!({"a": 5, "b": 7}))
        .respond_with("Adder", |request| Ok(ModelResponse::text(last_text(request))))
}

#[tokio::test]
async fn test_greeter_echo_adder_pipeline() {
    let mut harness = TestHarnessBuilder::new(pipeline_model())
        .with_standard_tools()
        .with_agent("Greeter", &[])
        .with_agent("Echo", &["echo"])
        .with_agent("Adder", &["add"])
        .with_flow(
            "pipeline",
            Pattern::sequential(NonEmptyVec::new(step("Greeter"), vec![step("Echo"), step("Adder")])),
        )
        .build()
        .expect("valid harness");

    let result = harness
        .run_scenario(TestScenario::flow("pipeline", "5,7").expect_output("12"))
        .await;

    assert!(result.is_success(), "{}", result);
    assert_eq!(result.answer_text(), "12");
    // Greeter once, Echo and Adder twice each (tool call, then answer).
    assert_eq!(result.model_calls, 5);

    let contents: Vec<&str> = result.history.iter().map(|m| m.content()).collect();
    assert_eq!(contents.first(), Some(&"5,7"));
    assert!(contents.contains(&"Hello! You sent 5,7"));
    let tool_results: Vec<&str> = result
        .history
        .iter()
        .filter(|m| m.role() == Role::Tool)
        .map(|m| m.content())
        .collect();
    assert_eq!(tool_results, vec!["numbers 5,7", "12"]);

    // Each step received the previous step's answer.
    let echo_input = &harness.model().requests_for("Echo")[0];
    assert_eq!(last_text(echo_input), "Hello! You sent 5,7");
    let adder_input = &harness.model().requests_for("Adder")[0];
    assert_eq!(last_text(adder_input), "numbers 5,7");
}

#[tokio::test]
async fn test_harness_reports_failing_scenarios() {
    let mut harness = TestHarnessBuilder::new(ScriptedModel::new().echo_fallback())
        .with_agent("Echo", &[])
        .build()
        .expect("valid harness");

    harness
        .run_scenario(TestScenario::agent("Echo", "ping").expect_output("Echo: ping"))
        .await;
    harness
        .run_scenario(TestScenario::agent("Echo", "ping").expect_output("pong"))
        .await;
    harness
        .run_scenario(TestScenario::agent("Nobody", "ping").named("unknown agent").should_fail())
        .await;

    assert_eq!(harness.summary(), (2, 3));
    assert!(!harness.results()[1].is_success());
    assert!(harness.results()[2].summary().starts_with("[PASS] unknown agent"));
}

#[tokio::test]
async fn test_demo_configuration_builds() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/concerto.yaml");
    let doc = ConfigDocument::from_path(path).expect("demo config parses");
    let app = doc
        .apply(Application::builder(Arc::new(ScriptedModel::new().echo_fallback())))
        .expect("demo flows are valid")
        .tools(concerto::tools::standard::all())
        .build()
        .expect("demo application builds");

    assert_eq!(app.agents().count(), 8);
    let mut flows: Vec<&str> = app.flows().map(|f| f.name.as_str()).collect();
    flows.sort_unstable();
    assert_eq!(flows, vec!["debate", "fan_out", "pipeline", "triage"]);
    assert_eq!(app.settings().max_iterations, 6);
}

#[tokio::test]
async fn test_session_resumes_from_file_store() {
    let dir = TempDir::new().unwrap();
    let session = SessionId::generate();
    let build = |store: Arc<FileStore>| {
        Application::builder(Arc::new(
            ScriptedModel::new().respond_with("Counter", |request| {
                Ok(ModelResponse::text(format!("seen {}", request.history.len())))
            }),
        ))
        .memory(store)
        .agent(concerto::AgentSpec::new(concerto::AgentName::new_unchecked("Counter")))
        .build()
        .unwrap()
    };

    let first = build(Arc::new(FileStore::open(dir.path()).await.unwrap()));
    let answer = RuntimeContext::scope(first, session.clone(), |ctx| async move {
        ctx.call_agent("Counter", "one").await
    })
    .await
    .unwrap();
    assert_eq!(answer.content(), "seen 1");

    // A new process opening the same directory continues the session.
    let second = build(Arc::new(FileStore::open(dir.path()).await.unwrap()));
    let answer = RuntimeContext::scope(second, session.clone(), |ctx| async move {
        ctx.call_agent("Counter", "two").await
    })
    .await
    .unwrap();
    assert_eq!(answer.content(), "seen 3");

    let log = FileStore::open(dir.path()).await.unwrap().read(&session, None).await.unwrap();
    let contents: Vec<String> = log.into_iter().map(|m| m.into_content()).collect();
    assert_eq!(contents, vec!["one", "seen 1", "two", "seen 3"]);
}

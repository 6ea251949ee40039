//! Agent execution loop: tool dispatch, iteration cap, retries, call depth
//! and streaming.

use std::sync::Arc;
use std::time::Duration;

use concerto_agent::{
    AgentEvent, Application, FlowError, ModelError, ModelResponse, RuntimeSettings, TRUNCATION_MARKER,
};
use concerto_core::agent::AgentSpec;
use concerto_core::identifiers::{AgentName, SessionId, ToolName};
use concerto_core::message::{Role, ToolCall};
use concerto_core::tool::ToolOutput;
use concerto_testing::{MockTool, ScriptedModel, last_text};
use concerto_tools::FunctionTool;
use futures::StreamExt;
use serde_json::json;

fn agent(name: &str) -> AgentSpec {
    AgentSpec::new(AgentName::new_unchecked(name))
}

fn call(tool: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse::default().with_tool_call(ToolCall::new(ToolName::new_unchecked(tool), arguments))
}

/// Replies with the newest user or tool message.
fn parrot(model: ScriptedModel, agent: &str) -> ScriptedModel {
    model.respond_with(agent, |request| Ok(ModelResponse::text(last_text(request))))
}

fn fast_retries() -> RuntimeSettings {
    RuntimeSettings::default()
        .with_model_retries(2)
        .with_retry_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn test_tool_loop_feeds_result_back() {
    let model = Arc::new(parrot(
        ScriptedModel::new().call_tool("Adder", "add", json!({"text": "5,7"})),
        "Adder",
    ));
    let app = Application::builder(model.clone())
        .tools(concerto_tools::standard::all())
        .agent(agent("Adder").with_tool(ToolName::new_unchecked("add")))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let answer = ctx.call_agent("Adder", "5,7").await.unwrap();
    assert_eq!(answer.content(), "12");
    assert_eq!(answer.author().map(AgentName::as_str), Some("Adder"));

    let history = ctx.history(None).await.unwrap();
    let roles: Vec<Role> = history.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert!(history[1].has_tool_calls());

    // The second turn sees the tool result and the tool list.
    let requests = model.requests_for("Adder");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].history.len(), 3);
    assert_eq!(requests[0].tools[0].name.as_str(), "add");
    assert!(requests[0].system_prompt.contains("You can call the following tools:"));
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_iteration_cap_truncates() {
    let model = Arc::new(
        ScriptedModel::new().respond_with("Looper", |_| {
            Ok(ModelResponse {
                text: "thinking".into(),
                ..call("echo", json!("again"))
            })
        }),
    );
    let app = Application::builder(model.clone())
        .settings(RuntimeSettings::default().with_max_iterations(3))
        .tools(concerto_tools::standard::all())
        .agent(agent("Looper").with_tool(ToolName::new_unchecked("echo")))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let answer = ctx.call_agent("Looper", "go").await.unwrap();
    assert_eq!(answer.content(), format!("thinking\n{}", TRUNCATION_MARKER));
    assert_eq!(answer.metadata_value("truncated"), Some(&json!(true)));
    assert_eq!(model.calls_for("Looper"), 3);
}

#[tokio::test]
async fn test_retryable_model_errors_are_bounded() {
    let model = Arc::new(
        ScriptedModel::new()
            .fail("Flaky", ModelError::Unavailable("down".into()))
            .fail("Flaky", ModelError::RateLimited("slow down".into()))
            .fail("Flaky", ModelError::Unavailable("still down".into()))
            .reply("Flaky", "never reached"),
    );
    let app = Application::builder(model.clone())
        .settings(fast_retries())
        .agent(agent("Flaky"))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let err = ctx.call_agent("Flaky", "hi").await.unwrap_err();
    assert!(matches!(err, FlowError::ModelCall { attempts: 3, .. }), "{err:?}");
    assert_eq!(err.error_code(), "MODEL_CALL_FAILED");
    assert_eq!(model.calls_for("Flaky"), 3);
}

#[tokio::test]
async fn test_retry_recovers() {
    let model = Arc::new(
        ScriptedModel::new()
            .fail("Flaky", ModelError::Unavailable("blip".into()))
            .reply("Flaky", "recovered"),
    );
    let app = Application::builder(model.clone())
        .settings(fast_retries())
        .agent(agent("Flaky"))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    assert_eq!(ctx.call_agent("Flaky", "hi").await.unwrap().content(), "recovered");
    assert_eq!(model.calls_for("Flaky"), 2);
}

#[tokio::test]
async fn test_non_retryable_error_fails_immediately() {
    let model = Arc::new(ScriptedModel::new().fail("Strict", ModelError::InvalidRequest("bad".into())));
    let app = Application::builder(model.clone())
        .settings(fast_retries())
        .agent(agent("Strict"))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let err = ctx.call_agent("Strict", "hi").await.unwrap_err();
    assert!(matches!(err, FlowError::ModelCall { attempts: 1, .. }));
    assert_eq!(model.calls_for("Strict"), 1);
}

#[tokio::test]
async fn test_model_timeout_is_retried_then_reported() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_latency("Sleepy", Duration::from_millis(200))
            .reply("Sleepy", "late")
            .reply("Sleepy", "late again"),
    );
    let app = Application::builder(model.clone())
        .settings(
            RuntimeSettings::default()
                .with_model_timeout(Duration::from_millis(20))
                .with_model_retries(1)
                .with_retry_backoff(Duration::from_millis(1)),
        )
        .agent(agent("Sleepy"))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let err = ctx.call_agent("Sleepy", "hi").await.unwrap_err();
    match err {
        FlowError::ModelCall { attempts, source, .. } => {
            assert_eq!(attempts, 2);
            assert!(matches!(source, ModelError::Timeout(_)));
        }
        other => panic!("expected model call failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_recursion_limit_stops_mutual_calls() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond_with("A", |_| Ok(call("B", json!({"input": "ping"}))))
            .respond_with("B", |_| Ok(call("A", json!({"input": "pong"})))),
    );
    let app = Application::builder(model.clone())
        .settings(RuntimeSettings::default().with_max_call_depth(3))
        .agent(agent("A").with_callable_agent(AgentName::new_unchecked("B")))
        .agent(agent("B").with_callable_agent(AgentName::new_unchecked("A")))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let err = ctx.call_agent("A", "start").await.unwrap_err();
    match &err {
        FlowError::RecursionLimit { chain, limit } => {
            assert_eq!(*limit, 3);
            assert_eq!(chain, &["A", "B", "A", "B"]);
        }
        other => panic!("expected recursion limit, got {other:?}"),
    }
    assert_eq!(err.to_string(), "Agent call depth limit 3 exceeded: A -> B -> A -> B");
    assert_eq!(model.calls_for("A"), 2);
    assert_eq!(model.calls_for("B"), 1);
}

#[tokio::test]
async fn test_nested_agent_failure_becomes_tool_error() {
    let model = Arc::new(parrot(
        ScriptedModel::new()
            .call_tool("Lead", "Helper", json!({"input": "help"}))
            .fail("Helper", ModelError::InvalidRequest("nope".into())),
        "Lead",
    ));
    let app = Application::builder(model.clone())
        .agent(agent("Lead").with_callable_agent(AgentName::new_unchecked("Helper")))
        .agent(agent("Helper"))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let answer = ctx.call_agent("Lead", "go").await.unwrap();
    assert!(answer.content().starts_with("Error: Agent 'Helper' failed"), "{}", answer.content());
    assert_eq!(last_text(&model.requests_for("Helper")[0]), "help");
}

#[tokio::test]
async fn test_tool_failures_are_reported_to_the_model() {
    let slow = MockTool::new("slow")
        .with_default_response("done")
        .with_delay(Duration::from_millis(200));
    let panicking = FunctionTool::sync("explode", "Always panics", |_| -> concerto_core::error::ToolResult<ToolOutput> {
        panic!("boom")
    });
    let model = Arc::new(parrot(
        ScriptedModel::new()
            .call_tool("Worker", "slow", json!({}))
            .call_tool("Worker", "explode", json!({}))
            .call_tool("Worker", "missing", json!({})),
        "Worker",
    ));
    let app = Application::builder(model.clone())
        .settings(RuntimeSettings::default().with_tool_timeout(Duration::from_millis(20)))
        .tool(Arc::new(slow))
        .tool(Arc::new(panicking))
        .agent(agent("Worker").with_tools([ToolName::new_unchecked("slow"), ToolName::new_unchecked("explode")]))
        .build()
        .unwrap();
    let ctx = app.start().await.unwrap();

    let answer = ctx.call_agent("Worker", "go").await.unwrap();
    assert_eq!(answer.content(), "Error: Tool 'missing' is not available");

    let results: Vec<String> = ctx
        .history(None)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.role() == Role::Tool)
        .map(|m| m.into_content())
        .collect();
    assert_eq!(results[0], "Error: Tool 'slow' timed out after 20ms");
    assert_eq!(results[1], "Error: Execution failed: tool 'explode' panicked");
}

#[tokio::test]
async fn test_streaming_matches_blocking_answer() {
    let script = || {
        ScriptedModel::new()
            .call_tool("Greeter", "echo", json!({"text": "hi"}))
            .reply("Greeter", "Hello there, friend")
    };
    let build = |model: ScriptedModel| {
        Application::builder(Arc::new(model))
            .tools(concerto_tools::standard::all())
            .agent(agent("Greeter").with_tool(ToolName::new_unchecked("echo")))
            .build()
            .unwrap()
    };

    let blocking = build(script()).start().await.unwrap().call_agent("Greeter", "hi").await.unwrap();

    let ctx = build(script()).start_session(SessionId::generate()).await.unwrap();
    let events: Vec<AgentEvent> = ctx
        .call_agent_streaming("Greeter", "hi")
        .map(|event| event.unwrap())
        .collect()
        .await;

    let deltas: String = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::TextDelta { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, "Hello there, friend");
    assert!(matches!(events[0], AgentEvent::ToolCallRequested { .. }));
    assert!(matches!(events[1], AgentEvent::ToolResult { .. }));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let Some(AgentEvent::Completed(answer)) = events.last() else {
        panic!("stream must end with the final answer");
    };
    assert_eq!(answer.content(), blocking.content());
}

#[tokio::test]
async fn test_streaming_unknown_agent_yields_error() {
    let app = Application::builder(Arc::new(ScriptedModel::new())).build().unwrap();
    let ctx = app.start().await.unwrap();

    let events: Vec<_> = ctx.call_agent_streaming("Nobody", "hi").collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Err(FlowError::AgentNotFound(_))));
}

#[tokio::test]
async fn test_cancel_interrupts_model_call() {
    let model = Arc::new(
        ScriptedModel::new()
            .with_latency("Slow", Duration::from_secs(10))
            .reply("Slow", "too late"),
    );
    let app = Application::builder(model).agent(agent("Slow")).build().unwrap();
    let ctx = app.start().await.unwrap();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = ctx.call_agent("Slow", "hi").await.unwrap_err();
    assert!(matches!(err, FlowError::Cancelled));
    assert!(matches!(ctx.call_agent("Slow", "again").await, Err(FlowError::Cancelled)));
}

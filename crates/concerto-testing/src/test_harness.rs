//! # Application Test Harness
//!
//! Builds a small [`Application`] around a [`ScriptedModel`] and runs
//! scenarios against it, collecting the answer, the model traffic and the
//! session history for assertions.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use concerto_agent::{Application, FlowError, FlowResult, RuntimeContext, RuntimeSettings};
use concerto_core::agent::AgentSpec;
use concerto_core::error::ConfigResult;
use concerto_core::identifiers::{AgentName, FlowName, SessionId, ToolName};
use concerto_core::message::Message;
use concerto_core::pattern::{Flow, Pattern};
use concerto_mcp::ServerConnector;
use concerto_memory::MemoryStore;
use concerto_tools::LocalTool;

use crate::model::ScriptedModel;

/// What a scenario runs.
#[derive(Debug, Clone)]
pub enum ScenarioTarget {
    Agent(String),
    Flow(String),
}

/// Test scenario for a single run
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub target: ScenarioTarget,
    pub input: String,
    /// Substrings the answer must contain
    pub expected_output: Vec<String>,
    pub timeout: Duration,
    pub should_succeed: bool,
}

impl TestScenario {
    pub fn agent(agent: impl Into<String>, input: impl Into<String>) -> Self {
        Self::new(ScenarioTarget::Agent(agent.into()), input)
    }

    pub fn flow(flow: impl Into<String>, input: impl Into<String>) -> Self {
        Self::new(ScenarioTarget::Flow(flow.into()), input)
    }

    fn new(target: ScenarioTarget, input: impl Into<String>) -> Self {
        let name = match &target {
            ScenarioTarget::Agent(name) | ScenarioTarget::Flow(name) => name.clone(),
        };
        Self {
            name,
            target,
            input: input.into(),
            expected_output: Vec::new(),
            timeout: Duration::from_secs(5),
            should_succeed: true,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn expect_output(mut self, fragment: impl Into<String>) -> Self {
        self.expected_output.push(fragment.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Expect the scenario to fail
    pub fn should_fail(mut self) -> Self {
        self.should_succeed = false;
        self
    }
}

/// Result of a test scenario execution
#[derive(Debug)]
pub struct TestResult {
    pub scenario_name: String,
    pub passed: bool,
    pub answer: Option<Message>,
    pub error: Option<FlowError>,
    pub model_calls: usize,
    pub history: Vec<Message>,
    pub execution_time: Duration,
}

impl TestResult {
    pub fn is_success(&self) -> bool {
        self.passed
    }

    pub fn answer_text(&self) -> &str {
        self.answer.as_ref().map(Message::content).unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let time = self.execution_time.as_millis();
        match &self.error {
            Some(error) => format!("[{}] {} ({}ms) - {}", status, self.scenario_name, time, error),
            None => format!("[{}] {} ({}ms)", status, self.scenario_name, time),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Builder for creating test harnesses
pub struct TestHarnessBuilder {
    model: ScriptedModel,
    agents: Vec<AgentSpec>,
    flows: Vec<Flow>,
    tools: Vec<Arc<dyn LocalTool>>,
    servers: Vec<Arc<dyn ServerConnector>>,
    memory: Option<Arc<dyn MemoryStore>>,
    settings: RuntimeSettings,
}

impl TestHarnessBuilder {
    pub fn new(model: ScriptedModel) -> Self {
        Self {
            model,
            agents: Vec::new(),
            flows: Vec::new(),
            tools: Vec::new(),
            servers: Vec::new(),
            memory: None,
            settings: RuntimeSettings::default(),
        }
    }

    /// Add a plain agent with the given tool bindings
    pub fn with_agent(mut self, name: &str, tools: &[&str]) -> Self {
        let spec = AgentSpec::new(AgentName::new_unchecked(name))
            .with_system_prompt(format!("You are {}.", name))
            .with_tools(tools.iter().map(|t| ToolName::new_unchecked(*t)));
        self.agents.push(spec);
        self
    }

    pub fn with_agent_spec(mut self, spec: AgentSpec) -> Self {
        self.agents.push(spec);
        self
    }

    pub fn with_flow(mut self, name: &str, pattern: Pattern) -> Self {
        self.flows.push(Flow::new(FlowName::new_unchecked(name), pattern));
        self
    }

    /// Register `echo`, `add` and `text_transform`
    pub fn with_standard_tools(mut self) -> Self {
        self.tools.extend(concerto_tools::standard::all());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn LocalTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_server(mut self, server: Arc<dyn ServerConnector>) -> Self {
        self.servers.push(server);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ConfigResult<TestHarness> {
        let model = Arc::new(self.model);
        let mut builder = Application::builder(model.clone())
            .settings(self.settings)
            .agents(self.agents)
            .flows(self.flows)
            .tools(self.tools);
        for server in self.servers {
            builder = builder.server(server);
        }
        if let Some(memory) = self.memory {
            builder = builder.memory(memory);
        }
        Ok(TestHarness {
            app: builder.build()?,
            model,
            results: Vec::new(),
        })
    }
}

/// Runs scenarios against a built application, one fresh session each.
pub struct TestHarness {
    app: Arc<Application>,
    model: Arc<ScriptedModel>,
    results: Vec<TestResult>,
}

impl TestHarness {
    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    pub fn model(&self) -> &ScriptedModel {
        &self.model
    }

    /// Start a context on a new session.
    pub async fn context(&self) -> FlowResult<RuntimeContext> {
        self.app.start().await
    }

    pub async fn run_scenario(&mut self, scenario: TestScenario) -> &TestResult {
        let started = Instant::now();
        let calls_before = self.model.total_calls();
        let session = SessionId::generate();

        let target = scenario.target.clone();
        let input = scenario.input.clone();
        let outcome = tokio::time::timeout(
            scenario.timeout,
            RuntimeContext::scope(self.app.clone(), session.clone(), |ctx| async move {
                match target {
                    ScenarioTarget::Agent(agent) => ctx.call_agent(&agent, input).await,
                    ScenarioTarget::Flow(flow) => ctx.run_flow(&flow, input).await,
                }
            }),
        )
        .await
        .unwrap_or(Err(FlowError::Cancelled));

        let history = self.app.memory().read(&session, None).await.unwrap_or_default();
        let (answer, error) = match outcome {
            Ok(message) => (Some(message), None),
            Err(e) => (None, Some(e)),
        };
        let passed = match &answer {
            Some(message) => {
                scenario.should_succeed
                    && scenario
                        .expected_output
                        .iter()
                        .all(|fragment| message.content().contains(fragment.as_str()))
            }
            None => !scenario.should_succeed,
        };

        self.results.push(TestResult {
            scenario_name: scenario.name,
            passed,
            answer,
            error,
            model_calls: self.model.total_calls() - calls_before,
            history,
            execution_time: started.elapsed(),
        });
        let index = self.results.len() - 1;
        &self.results[index]
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Returns (passed, total).
    pub fn summary(&self) -> (usize, usize) {
        let passed = self.results.iter().filter(|r| r.passed).count();
        (passed, self.results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_agent_scenario_with_tool() {
        let model = ScriptedModel::new()
            .call_tool("Adder", "add", json!("5,7"))
            .reply("Adder", "The sum is 12");
        let mut harness = TestHarnessBuilder::new(model)
            .with_standard_tools()
            .with_agent("Adder", &["add"])
            .build()
            .unwrap();

        let result = harness
            .run_scenario(TestScenario::agent("Adder", "5,7").expect_output("12"))
            .await;
        assert!(result.is_success(), "{}", result);
        assert_eq!(result.model_calls, 2);
        assert!(result.history.iter().any(|m| m.content() == "12"));
    }

    #[tokio::test]
    async fn test_expected_failure_passes() {
        let mut harness = TestHarnessBuilder::new(ScriptedModel::new())
            .with_agent("Silent", &[])
            .build()
            .unwrap();

        let result = harness
            .run_scenario(TestScenario::agent("Silent", "hi").should_fail())
            .await;
        assert!(result.is_success());
        assert!(result.error.is_some());
        assert_eq!(harness.summary(), (1, 1));
    }
}

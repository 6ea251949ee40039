//! # Concerto Testing Framework
//!
//! Testing utilities for Concerto applications: a scripted model binding,
//! mock tools, a mock capability server that counts its lifecycle, and a
//! harness that runs scenarios against a small application.
//!
//! ## Components
//!
//! - **Scripted Model**: per-agent queues of canned model answers
//! - **Mock Tools**: predictable tool implementations with call tracking
//! - **Mock Server**: capability server with connect/call/close counters
//! - **Test Harness**: scenario runner over a fresh session per run
//!
//! ## Usage
//!
//! ```rust
//! use concerto_testing::{ScriptedModel, TestHarnessBuilder, TestScenario};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let model = ScriptedModel::new()
//!     .call_tool("Adder", "add", json!({"text": "5,7"}))
//!     .reply("Adder", "12");
//! let mut harness = TestHarnessBuilder::new(model)
//!     .with_standard_tools()
//!     .with_agent("Adder", &["add"])
//!     .build()
//!     .unwrap();
//!
//! let result = harness.run_scenario(TestScenario::agent("Adder", "5,7").expect_output("12")).await;
//! assert!(result.is_success());
//! # });
//! ```

/// Mock tools for predictable testing
pub mod mock_tools;
/// Capability server with lifecycle counters
pub mod mock_server;
/// Scripted model binding
pub mod model;
/// Scenario runner
pub mod test_harness;

pub use mock_server::{MockCapabilityServer, ServerStats};
pub use mock_tools::MockTool;
pub use model::{Responder, ScriptedModel, last_text};
pub use test_harness::{ScenarioTarget, TestHarness, TestHarnessBuilder, TestResult, TestScenario};

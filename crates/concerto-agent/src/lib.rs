//! # Concerto Agent - Execution Runtime
//!
//! This crate runs agents and flows: the agent execution loop, the pattern
//! engine and the runtime context that owns capability connections and
//! session memory for the duration of a run.
//!
//! ## Features
//!
//! - **Application registry**: agents, flows, tools and servers validated once by [`ApplicationBuilder`]
//! - **Agent executor**: model turns, tool dispatch, agent-as-tool calls with a depth limit
//! - **Patterns**: sequential, parallel, router and discussion composition
//! - **Streaming**: incremental [`AgentEvent`]s ending in one final event
//! - **Configuration documents**: YAML/JSON loading via [`ConfigDocument`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use concerto_agent::{Application, ConfigDocument, RuntimeContext};
//! use concerto_core::SessionId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = ConfigDocument::from_path("concerto.yaml")?;
//!     let app = doc.apply(Application::builder(model))?.tools(concerto_tools::standard::all()).build()?;
//!
//!     let answer = RuntimeContext::scope(app, SessionId::generate(), |ctx| async move {
//!         ctx.run_flow("demo", "5,7").await
//!     })
//!     .await?;
//!     println!("{}", answer.content());
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod model;
pub mod patterns;
pub mod settings;
pub mod stream;

pub use app::{Application, ApplicationBuilder, DefaultTarget};
pub use chat::ChatSummary;
pub use config::ConfigDocument;
pub use context::RuntimeContext;
pub use error::{FlowError, FlowResult};
pub use executor::{CallChain, TRUNCATION_MARKER};
pub use model::{ModelBinding, ModelError, ModelEvent, ModelRequest, ModelResponse, ModelStream};
pub use patterns::{TaskOutcome, TaskResults};
pub use settings::RuntimeSettings;
pub use stream::{AgentEvent, AgentStream};

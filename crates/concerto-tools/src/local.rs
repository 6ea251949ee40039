//! In-process tools.

use async_trait::async_trait;
use concerto_core::error::{ToolError, ToolResult};
use concerto_core::tool::{ToolOutput, ToolSpec};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A tool implemented in-process.
///
/// Implementations report failures as [`ToolError`]; they must not panic.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Name the tool is invoked by.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value {
        ToolSpec::empty_parameters()
    }

    /// Execute the tool.
    async fn call(&self, arguments: Value) -> ToolResult<ToolOutput>;
}

/// Typed tool arguments decoded from the JSON the model produced.
///
/// A bare JSON string is accepted when the type supports it through
/// [`ToolArgs::from_simple`], so a model that answers `"hello"` instead of
/// `{"text": "hello"}` still gets a result.
pub trait ToolArgs: DeserializeOwned {
    fn from_simple(_input: String) -> Option<Self> {
        None
    }

    fn parse(tool: &str, arguments: Value) -> ToolResult<Self> {
        match arguments {
            Value::String(input) => {
                let fallback = input.clone();
                Self::from_simple(input)
                    .or_else(|| serde_json::from_str(&fallback).ok())
                    .ok_or_else(|| ToolError::invalid_input(tool, "expected a JSON object"))
            }
            other => serde_json::from_value(other)
                .map_err(|e| ToolError::invalid_input(tool, e.to_string())),
        }
    }
}

type ToolFn = dyn Fn(Value) -> BoxFuture<'static, ToolResult<ToolOutput>> + Send + Sync;

/// A tool backed by a closure.
///
/// ```rust
/// use concerto_tools::{FunctionTool, LocalTool};
/// use concerto_core::ToolOutput;
///
/// let shout = FunctionTool::sync("shout", "Uppercase the input", |args| {
///     Ok(ToolOutput::from(args.to_string().to_uppercase()))
/// });
/// assert_eq!(shout.name(), "shout");
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    /// Wrap an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<ToolOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolSpec::empty_parameters(),
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }

    /// Wrap a synchronous closure.
    pub fn sync<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> ToolResult<ToolOutput> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, description, move |args| {
            let func = Arc::clone(&func);
            async move { func(args) }
        })
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LocalTool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, arguments: Value) -> ToolResult<ToolOutput> {
        (self.func)(arguments).await
    }
}

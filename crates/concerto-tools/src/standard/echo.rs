use async_trait::async_trait;
use concerto_core::error::ToolResult;
use concerto_core::tool::ToolOutput;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::local::{LocalTool, ToolArgs};

#[derive(Debug, Deserialize)]
struct EchoArgs {
    text: String,
}

impl ToolArgs for EchoArgs {
    fn from_simple(input: String) -> Option<Self> {
        Some(Self { text: input })
    }
}

/// Returns its `text` argument unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTool;

impl EchoTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn call(&self, arguments: Value) -> ToolResult<ToolOutput> {
        let args = EchoArgs::parse(self.name(), arguments)?;
        Ok(ToolOutput::Text(args.text))
    }
}

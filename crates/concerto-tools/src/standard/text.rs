//! Text transformation tool.

use async_trait::async_trait;
use concerto_core::error::ToolResult;
use concerto_core::tool::ToolOutput;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::local::{LocalTool, ToolArgs};

/// Operation applied by [`TextTransformTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOperation {
    #[default]
    Uppercase,
    Lowercase,
    Reverse,
    WordCount,
}

#[derive(Debug, Deserialize)]
struct TextArgs {
    text: String,
    #[serde(default)]
    operation: TextOperation,
}

impl ToolArgs for TextArgs {}

/// Uppercase, lowercase, reverse or count the words of a text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextTransformTool;

impl TextTransformTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalTool for TextTransformTool {
    fn name(&self) -> &str {
        "text_transform"
    }

    fn description(&self) -> &str {
        "Transform text: uppercase, lowercase, reverse, or word_count"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "operation": {
                    "type": "string",
                    "enum": ["uppercase", "lowercase", "reverse", "word_count"]
                }
            },
            "required": ["text"]
        })
    }

    async fn call(&self, arguments: Value) -> ToolResult<ToolOutput> {
        let args = TextArgs::parse(self.name(), arguments)?;
        let result = match args.operation {
            TextOperation::Uppercase => args.text.to_uppercase(),
            TextOperation::Lowercase => args.text.to_lowercase(),
            TextOperation::Reverse => args.text.chars().rev().collect(),
            TextOperation::WordCount => args.text.split_whitespace().count().to_string(),
        };
        Ok(ToolOutput::Text(result))
    }
}

use async_trait::async_trait;
use concerto_core::error::{ToolError, ToolResult};
use concerto_core::tool::ToolOutput;
use serde_json::{Number, Value, json};

use crate::local::LocalTool;

/// Sums every numeric argument.
///
/// Accepts an object (`{"a": 5, "b": 7}`), an array (`[5, 7]`) or a string
/// of comma- or whitespace-separated numbers (`"5,7"`). Numeric strings
/// inside objects and arrays are accepted as well. Integer sums stay
/// integers.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddTool;

impl AddTool {
    pub fn new() -> Self {
        Self
    }

    fn collect(&self, value: &Value, out: &mut Vec<Number>) -> ToolResult<()> {
        match value {
            Value::Number(n) => out.push(n.clone()),
            Value::String(s) => {
                for part in s.split(|c: char| c == ',' || c.is_whitespace()) {
                    let part = part.trim();
                    if part.is_empty() {
                        continue;
                    }
                    let n: Number = part.parse().map_err(|_| {
                        ToolError::invalid_input(self.name(), format!("'{}' is not a number", part))
                    })?;
                    out.push(n);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect(item, out)?;
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.collect(item, out)?;
                }
            }
            Value::Null | Value::Bool(_) => {
                return Err(ToolError::invalid_input(
                    self.name(),
                    format!("unexpected argument {}", value),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LocalTool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add numbers together and return the sum"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "additionalProperties": { "type": "number" }
        })
    }

    async fn call(&self, arguments: Value) -> ToolResult<ToolOutput> {
        let mut numbers = Vec::new();
        self.collect(&arguments, &mut numbers)?;
        if numbers.is_empty() {
            return Err(ToolError::invalid_input(self.name(), "no numbers to add"));
        }

        if numbers.iter().all(|n| n.is_i64()) {
            let sum = numbers
                .iter()
                .filter_map(Number::as_i64)
                .try_fold(0i64, i64::checked_add)
                .ok_or_else(|| ToolError::execution_failed(self.name(), "integer overflow"))?;
            return Ok(ToolOutput::Text(sum.to_string()));
        }

        let sum: f64 = numbers.iter().filter_map(Number::as_f64).sum();
        Ok(ToolOutput::Text(sum.to_string()))
    }
}

//! Offline model binding used when no provider is configured.
//!
//! Deterministic rules, enough to walk every step of a flow:
//!
//! 1. A fresh user message and at least one available tool: call the first
//!    tool with `{"text": <message>}`.
//! 2. The newest message is a tool result: answer with its content.
//! 3. Otherwise answer `"<agent>: <message>"`.

use async_trait::async_trait;
use concerto_agent::{ModelBinding, ModelError, ModelRequest, ModelResponse};
use concerto_core::message::{Role, ToolCall};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunModel;

#[async_trait]
impl ModelBinding for DryRunModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let Some(last) = request.last_message() else {
            return Err(ModelError::InvalidRequest("empty conversation".to_string()));
        };

        let response = match (last.role(), request.tools.first()) {
            (Role::User, Some(tool)) => {
                let call = ToolCall::new(tool.name.clone(), json!({ "text": last.content() }));
                ModelResponse::default().with_tool_call(call)
            }
            (Role::Tool, _) => ModelResponse::text(last.content()),
            _ => ModelResponse::text(format!("{}: {}", request.agent, last.content())),
        };
        debug!(
            agent = %request.agent,
            tool_calls = response.tool_calls.len(),
            "Dry-run model answered"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concerto_core::identifiers::{AgentName, ToolName};
    use concerto_core::message::Message;
    use concerto_core::tool::ToolSpec;

    fn request(history: Vec<Message>, tools: Vec<ToolSpec>) -> ModelRequest {
        ModelRequest {
            agent: AgentName::new_unchecked("Adder"),
            system_prompt: String::new(),
            history,
            tools,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_calls_first_tool_on_user_input() {
        let tools = vec![ToolSpec::new(ToolName::new_unchecked("add"), "Add numbers")];
        let response = DryRunModel
            .generate(request(vec![Message::user("5,7")], tools))
            .await
            .unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name.as_str(), "add");
        assert_eq!(response.tool_calls[0].arguments, json!({"text": "5,7"}));
    }

    #[tokio::test]
    async fn test_answers_with_tool_result() {
        let history = vec![Message::user("5,7"), Message::tool_result("call_1", "12")];
        let response = DryRunModel.generate(request(history, vec![])).await.unwrap();
        assert_eq!(response.text, "12");
        assert!(response.is_final());
    }

    #[tokio::test]
    async fn test_prefixes_agent_name_without_tools() {
        let response = DryRunModel
            .generate(request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap();
        assert_eq!(response.text, "Adder: hi");
    }

    #[tokio::test]
    async fn test_empty_history_is_rejected() {
        let err = DryRunModel.generate(request(vec![], vec![])).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidRequest(_)));
    }
}

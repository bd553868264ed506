use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::base::{Provider, Usage};
use super::configs::{AnthropicProviderConfig, ANTHROPIC_MAX_TOKENS};
use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
        let output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(anyhow!(
                "Authentication error with Claude API. Please check your ANTHROPIC_API_KEY."
            )),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let error_text = response.text().await?;
                Err(anyhow!("Request failed: {} - {}", status, error_text))
            }
        }
    }
}

/// Convert internal messages to Anthropic's message specification.
///
/// When no tools are on offer the API refuses tool blocks, so earlier tool
/// traffic is flattened into plain text.
pub fn messages_to_anthropic_spec(messages: &[Message], with_tools: bool) -> Vec<Value> {
    let mut anthropic_messages = Vec::new();

    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let mut blocks = Vec::new();
        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text.text}));
                    }
                }
                MessageContent::ToolRequest(request) => {
                    let (name, input) = match &request.tool_call {
                        Ok(call) => (call.name.clone(), call.arguments.clone()),
                        Err(_) => ("invalid_tool_call".to_string(), json!({})),
                    };
                    if with_tools {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": name,
                            "input": input,
                        }));
                    } else {
                        blocks.push(json!({
                            "type": "text",
                            "text": format!("[called tool {} with {}]", name, input),
                        }));
                    }
                }
                MessageContent::ToolResponse(response) => {
                    if with_tools {
                        blocks.push(json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": response.as_text(),
                            "is_error": response.tool_result.is_err(),
                        }));
                    } else {
                        blocks.push(json!({
                            "type": "text",
                            "text": format!("[tool result: {}]", response.as_text()),
                        }));
                    }
                }
            }
        }

        if !blocks.is_empty() {
            anthropic_messages.push(json!({"role": role, "content": blocks}));
        }
    }

    anthropic_messages
}

/// Convert internal tools to Anthropic's tool specification
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect()
}

/// Convert an Anthropic response body into an assistant message
pub fn anthropic_response_to_message(response: &Value) -> Result<Message> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

    let mut message = Message::assistant();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                let text = block.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                message = message.with_text(text);
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(|i| i.as_str())
                    .unwrap_or_default()
                    .to_string();
                let tool_call = match block.get("name").and_then(|n| n.as_str()) {
                    Some(name) => Ok(ToolCall::new(
                        name,
                        block.get("input").cloned().unwrap_or_else(|| json!({})),
                    )),
                    None => Err(AgentError::InvalidParameters(format!(
                        "Tool use block {} has no tool name",
                        id
                    ))),
                };
                message = message.with_tool_request(id, tool_call);
            }
            other => {
                tracing::debug!("skipping unsupported content block: {:?}", other);
            }
        }
    }

    Ok(message)
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_anthropic_spec(messages, !tools.is_empty()),
            "max_tokens": self.config.max_tokens.unwrap_or(ANTHROPIC_MAX_TOKENS),
        });

        if let Some(object) = payload.as_object_mut() {
            if !system.is_empty() {
                object.insert("system".to_string(), json!(system));
            }
            if !tools.is_empty() {
                object.insert("tools".to_string(), json!(tools_to_anthropic_spec(tools)));
            }
            if let Some(temp) = self.config.temperature {
                object.insert("temperature".to_string(), json!(temp));
            }
        }

        tracing::debug!(tools = tools.len(), messages = messages.len(), "requesting completion");
        let response = self.post(payload).await?;

        let message = anthropic_response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::Content;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quote_tool() -> Tool {
        Tool::new(
            "get_stock_quote",
            "Get current stock price and basic info for a given symbol",
            json!({
                "type": "object",
                "properties": {"symbol": {"type": "string"}},
                "required": ["symbol"]
            }),
        )
    }

    async fn setup_mock_server(response: ResponseTemplate) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let mut config = AnthropicProviderConfig::new("test_api_key");
        config.host = mock_server.uri();
        config.temperature = Some(0.7);

        let provider = AnthropicProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{
                "type": "text",
                "text": "Hello! How can I assist you today?"
            }],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 12,
                "output_tokens": 15
            }
        });

        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await?;

        assert_eq!(message.text(), "Hello! How can I assist you today?");
        assert!(!message.has_tool_request());
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_use() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "tools": [{"name": "get_stock_quote"}],
                "system": "Be brief."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Checking the price."},
                    {
                        "type": "tool_use",
                        "id": "toolu_01",
                        "name": "get_stock_quote",
                        "input": {"symbol": "AAPL"}
                    }
                ],
                "stop_reason": "tool_use"
            })))
            .mount(&mock_server)
            .await;

        let mut config = AnthropicProviderConfig::new("test_api_key");
        config.host = mock_server.uri();
        let provider = AnthropicProvider::new(config)?;

        let (message, _) = provider
            .complete(
                "Be brief.",
                &[Message::user().with_text("What is Apple trading at?")],
                &[quote_tool()],
            )
            .await?;

        let requests = message.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "toolu_01");
        let call = requests[0].tool_call.as_ref().unwrap();
        assert_eq!(call.name, "get_stock_quote");
        assert_eq!(call.arguments, json!({"symbol": "AAPL"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_mentions_api_key() {
        let (_server, provider) = setup_mock_server(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"type": "authentication_error"}})),
        )
        .await;

        let err = provider
            .complete("", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn test_server_error() {
        let (_server, provider) = setup_mock_server(ResponseTemplate::new(529)).await;

        let err = provider
            .complete("", &[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Server error"));
    }

    #[test]
    fn test_messages_to_anthropic_spec_with_tools() {
        let messages = vec![
            Message::user().with_text("Price of BTC?"),
            Message::assistant().with_tool_request(
                "t1",
                Ok(ToolCall::new("get_crypto_price", json!({"symbol": "BTC"}))),
            ),
            Message::user().with_tool_response(
                "t1",
                Ok(vec![Content::text("Crypto Price for BTC: $1")]),
            ),
        ];

        let spec = messages_to_anthropic_spec(&messages, true);
        assert_eq!(spec.len(), 3);
        assert_eq!(spec[0]["content"][0]["text"], "Price of BTC?");
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[1]["content"][0]["type"], "tool_use");
        assert_eq!(spec[1]["content"][0]["input"], json!({"symbol": "BTC"}));
        assert_eq!(spec[2]["role"], "user");
        assert_eq!(spec[2]["content"][0]["type"], "tool_result");
        assert_eq!(spec[2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(spec[2]["content"][0]["is_error"], false);
    }

    #[test]
    fn test_messages_to_anthropic_spec_flattens_without_tools() {
        let messages = vec![
            Message::assistant().with_tool_request(
                "t1",
                Ok(ToolCall::new("get_stock_quote", json!({"symbol": "MSFT"}))),
            ),
            Message::user().with_tool_response(
                "t1",
                Err(AgentError::Unavailable("connection refused".to_string())),
            ),
        ];

        let spec = messages_to_anthropic_spec(&messages, false);
        for message in &spec {
            for block in message["content"].as_array().unwrap() {
                assert_eq!(block["type"], "text");
            }
        }
        assert!(spec[1]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[test]
    fn test_empty_messages_are_skipped() {
        let spec = messages_to_anthropic_spec(&[Message::assistant().with_text("")], true);
        assert!(spec.is_empty());
    }

    #[test]
    fn test_response_without_content_is_rejected() {
        assert!(anthropic_response_to_message(&json!({"type": "error"})).is_err());
    }
}

//! OpenAI-compatible chat-completions provider.
//!
//! Works against api.openai.com and any server speaking the same wire
//! format (OpenRouter, vLLM, Ollama's `/v1`, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use zeroize::Zeroizing;

use super::{
    ContentBlock, LLMRequest, LLMResponse, Message, Provider, ProviderError, Result, Role,
    StopReason, TokenUsage, ToolDefinition,
};

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Zeroizing<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Zeroizing<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("searchcrabs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize, Debug)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize, Debug)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn to_wire_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(json!({ "role": "system", "content": system }));
    }

    for msg in messages {
        match msg.role {
            Role::User => {
                // Tool results travel as separate `tool` role messages.
                let mut text = String::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => out.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        })),
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
                if !text.is_empty() {
                    out.push(json!({ "role": "user", "content": text }));
                }
            }
            Role::Assistant => {
                let text = msg.text();
                let tool_calls: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, input } => Some(json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() },
                        })),
                        _ => None,
                    })
                    .collect();

                let mut wire = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                });
                if !tool_calls.is_empty() {
                    wire["tool_calls"] = Value::Array(tool_calls);
                }
                out.push(wire);
            }
        }
    }

    out
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

fn parse_stop_reason(reason: Option<&str>) -> Option<StopReason> {
    reason.map(|r| match r {
        "stop" => StopReason::EndTurn,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        _ => StopReason::Other,
    })
}

fn from_wire_response(resp: ChatResponse) -> Result<LLMResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("response contained no choices".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        content.push(ContentBlock::Text { text });
    }
    for call in choice.message.tool_calls {
        // Models occasionally emit invalid JSON arguments; hand the raw
        // string to the tool so it can report the problem back.
        let input = if call.function.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments))
        };
        content.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input,
        });
    }

    let usage = resp
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(LLMResponse {
        id: resp.id,
        model: resp.model,
        content,
        stop_reason: parse_stop_reason(choice.finish_reason.as_deref()),
        usage,
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4.1".to_string(),
            "gpt-4.1-mini".to_string(),
            "o3-mini".to_string(),
        ]
    }

    fn context_window(&self, model: &str) -> Option<u32> {
        let m = model.to_lowercase();
        if m.starts_with("gpt-4.1") {
            Some(1_047_576)
        } else if m.starts_with("gpt-4o") || m.starts_with("o3") || m.starts_with("o1") {
            Some(128_000)
        } else {
            None
        }
    }

    fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        crate::pricing::pricing().calculate_cost(model, input_tokens, output_tokens)
    }

    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey(self.name().to_string()));
        }

        let body = ChatRequest {
            messages: to_wire_messages(request.system.as_deref(), &request.messages),
            tools: to_wire_tools(&request.tools),
            model: request.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            "LLM request: model={} messages={} tools={}",
            body.model,
            body.messages.len(),
            body.tools.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: crate::utils::truncate_with_ellipsis(&body, 500),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        from_wire_response(parsed)
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn provider(url: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            url,
            Zeroizing::new("sk-test".to_string()),
            "gpt-4o-mini",
            Duration::from_secs(5),
        )
        .expect("provider")
    }

    #[test]
    fn test_wire_messages_split_tool_results() {
        let messages = vec![
            Message::user("find rust news"),
            Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "web_search".to_string(),
                    input: json!({"query": "rust news"}),
                }],
            },
            Message {
                role: Role::User,
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".to_string(),
                    content: "3 results".to_string(),
                    is_error: false,
                }],
            },
        ];

        let wire = to_wire_messages(Some("be brief"), &messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "find rust news");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "web_search");
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"rust news"}"#
        );
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_wire_tools_use_function_shape() {
        let wire = to_wire_tools(&[ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web".to_string(),
            input_schema: json!({"type": "object"}),
        }]);
        assert_eq!(wire[0]["type"], "function");
        assert_eq!(wire[0]["function"]["name"], "web_search");
        assert_eq!(wire[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_invalid_tool_arguments_are_kept_raw() {
        let resp = ChatResponse {
            id: "x".to_string(),
            model: "m".to_string(),
            choices: vec![Choice {
                message: ResponseMessage {
                    content: None,
                    tool_calls: vec![WireToolCall {
                        id: "c".to_string(),
                        function: WireFunction {
                            name: "web_search".to_string(),
                            arguments: "{not json".to_string(),
                        },
                    }],
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };

        let parsed = from_wire_response(resp).expect("parsed");
        assert_eq!(parsed.stop_reason, Some(StopReason::ToolUse));
        let uses = parsed.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].2, &Value::String("{not json".to_string()));
    }

    #[tokio::test]
    async fn test_complete_parses_text_and_tool_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({"model": "gpt-4o-mini"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "chatcmpl-1",
                    "model": "gpt-4o-mini",
                    "choices": [{
                        "index": 0,
                        "message": {
                            "role": "assistant",
                            "content": "Let me search.",
                            "tool_calls": [{
                                "id": "call_9",
                                "type": "function",
                                "function": {"name": "web_search", "arguments": "{\"query\":\"tokio\"}"}
                            }]
                        },
                        "finish_reason": "tool_calls"
                    }],
                    "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let request = LLMRequest::new("gpt-4o-mini", vec![Message::user("what is tokio?")])
            .with_tools(vec![ToolDefinition {
                name: "web_search".to_string(),
                description: "search".to_string(),
                input_schema: json!({"type": "object"}),
            }]);

        let resp = provider(&server.url())
            .complete(request)
            .await
            .expect("response");

        mock.assert_async().await;
        assert_eq!(resp.text(), "Let me search.");
        assert_eq!(resp.usage.input_tokens, 42);
        assert_eq!(resp.usage.output_tokens, 7);
        let uses = resp.tool_uses();
        assert_eq!(uses[0].0, "call_9");
        assert_eq!(uses[0].2["query"], "tokio");
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .create_async()
            .await;

        let err = provider(&server.url())
            .complete(LLMRequest::new("gpt-4o-mini", vec![Message::user("hi")]))
            .await
            .expect_err("should fail");

        assert!(
            matches!(&err, ProviderError::Api { status: 401, body } if body.contains("bad key")),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected_before_request() {
        let p = OpenAiProvider::new(
            "http://127.0.0.1:1",
            Zeroizing::new(String::new()),
            "gpt-4o-mini",
            Duration::from_secs(1),
        )
        .expect("provider");
        let err = p
            .complete(LLMRequest::new("gpt-4o-mini", vec![Message::user("hi")]))
            .await
            .expect_err("missing key");
        assert!(matches!(err, ProviderError::MissingApiKey(_)));
    }
}

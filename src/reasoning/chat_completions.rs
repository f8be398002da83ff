//! OpenAI 兼容的 Chat Completions 客户端

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::config::ReasoningConfig;
use crate::error::{AppError, Result};
use crate::models::session::Conversation;
use crate::models::turn::{ToolRequest, Turn};
use crate::reasoning::{ReasoningOutcome, ReasoningStep};
use crate::tools::ToolSpec;

pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    system_prompt: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl ChatCompletionsClient {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            system_prompt: config.system_prompt.clone(),
        })
    }

    /// 将对话历史转换为消息列表
    fn messages(&self, conversation: &Conversation) -> Vec<Value> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.system_prompt}));
        }

        for turn in &conversation.turns {
            match turn {
                Turn::User { text } => messages.push(json!({"role": "user", "content": text})),
                Turn::Assistant {
                    text,
                    tool_requests,
                } if tool_requests.is_empty() => {
                    messages.push(json!({"role": "assistant", "content": text}))
                }
                Turn::Assistant {
                    text,
                    tool_requests,
                } => {
                    let calls: Vec<WireToolCall> = tool_requests
                        .iter()
                        .map(|r| WireToolCall {
                            id: r.id.clone(),
                            kind: function_type(),
                            function: WireFunction {
                                name: r.tool_name.clone(),
                                arguments: Value::Object(r.arguments.clone()).to_string(),
                            },
                        })
                        .collect();
                    messages.push(json!({
                        "role": "assistant",
                        "content": text,
                        "tool_calls": calls,
                    }));
                }
                Turn::Tool(result) => messages.push(json!({
                    "role": "tool",
                    "tool_call_id": result.request_id,
                    "content": result.result_text,
                })),
            }
        }

        messages
    }

    fn request_body(&self, conversation: &Conversation, tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": self.messages(conversation),
        });

        if !tools.is_empty() {
            let declared: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(declared);
        }

        body
    }

    /// 单次请求；返回值中的布尔量表示错误是否可重试
    async fn send_once(&self, body: &Value) -> std::result::Result<AssistantMessage, (AppError, bool)> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| (AppError::Reasoning(format!("transport error: {}", e)), true))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err((
                AppError::Reasoning(format!("model endpoint returned {}: {}", status, error_text)),
                retryable,
            ));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| (AppError::Reasoning(format!("malformed completion: {}", e)), false))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| (AppError::Reasoning("completion has no choices".into()), false))
    }

    fn into_outcome(message: AssistantMessage) -> ReasoningOutcome {
        let text = message.content.unwrap_or_default();
        let requests = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = parse_call_arguments(&call.function.name, &call.function.arguments);
                if call.id.is_empty() {
                    ToolRequest::with_generated_id(&call.function.name, arguments)
                } else {
                    ToolRequest::new(&call.id, &call.function.name, arguments)
                }
            })
            .collect();
        ReasoningOutcome::from_parts(text, requests)
    }
}

/// 解析模型给出的参数 JSON；无法解析时返回空参数，由工具自身报告校验错误
fn parse_call_arguments(tool_name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!("Arguments for {} are not an object: {}", tool_name, other);
            Map::new()
        }
        Err(e) => {
            warn!("Malformed arguments for {}: {}", tool_name, e);
            Map::new()
        }
    }
}

#[async_trait]
impl ReasoningStep for ChatCompletionsClient {
    async fn reason(
        &self,
        conversation: &Conversation,
        tools: &[ToolSpec],
    ) -> Result<ReasoningOutcome> {
        let body = self.request_body(conversation, tools);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(message) => {
                    debug!(
                        "Reasoning step returned {} tool calls",
                        message.tool_calls.len()
                    );
                    return Ok(Self::into_outcome(message));
                }
                Err((e, true)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!("Reasoning attempt {} failed, retrying: {}", attempt, e);
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err((e, _)) => return Err(e),
            }
        }
    }
}

//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 function calling，
//! 将工具定义下发给模型，并把返回的 tool_calls 解析为 ProposedCall。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::types::{ModelReply, PromptMessage, PromptRole, ProposedCall, ToolDefinition};
use crate::llm::{LlmClient, LlmError};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client、模型名与请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn to_openai_messages(
    messages: &[PromptMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    messages
        .iter()
        .map(|m| {
            let msg = match m.role {
                PromptRole::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
                PromptRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()?,
                ),
                PromptRole::Assistant => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    if !m.content.is_empty() {
                        args.content(m.content.clone());
                    }
                    if !m.tool_calls.is_empty() {
                        args.tool_calls(
                            m.tool_calls
                                .iter()
                                .map(|c| {
                                    ChatCompletionMessageToolCalls::Function(
                                        ChatCompletionMessageToolCall {
                                            id: c.id.clone(),
                                            function: FunctionCall {
                                                name: c.name.clone(),
                                                arguments: c.args.to_string(),
                                            },
                                        },
                                    )
                                })
                                .collect::<Vec<_>>(),
                        );
                    }
                    ChatCompletionRequestMessage::Assistant(args.build()?)
                }
                PromptRole::Tool => ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(m.content.clone())
                        .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                        .build()?,
                ),
            };
            Ok(msg)
        })
        .collect()
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Vec<ChatCompletionTools> {
    tools
        .iter()
        .map(|t| {
            ChatCompletionTools::Function(ChatCompletionTool {
                function: FunctionObject {
                    name: t.name.clone(),
                    description: Some(t.description.clone()),
                    parameters: Some(t.parameters.clone()),
                    strict: None,
                },
            })
        })
        .collect()
}

/// 将 async_openai 错误归类为 LlmError
fn classify(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() => LlmError::Timeout,
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        OpenAIError::ApiError(api) => {
            let code = api.code.clone().unwrap_or_default();
            let kind = api.r#type.clone().unwrap_or_default();
            if code.contains("rate_limit") || code.contains("insufficient_quota") {
                LlmError::RateLimited(api.to_string())
            } else if code.contains("invalid_api_key") || kind.contains("authentication") {
                LlmError::Auth(api.to_string())
            } else {
                LlmError::Other(api.to_string())
            }
        }
        OpenAIError::JSONDeserialize(e, _) => LlmError::InvalidResponse(e.to_string()),
        other => LlmError::Other(other.to_string()),
    }
}

/// 解析工具调用参数；空字符串视为无参数
fn parse_call(call: ChatCompletionMessageToolCall) -> Result<ProposedCall, LlmError> {
    let raw = call.function.arguments.trim();
    let args = if raw.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(raw).map_err(|e| {
            LlmError::InvalidResponse(format!(
                "tool call `{}` has malformed arguments: {e}",
                call.function.name
            ))
        })?
    };
    Ok(ProposedCall {
        id: call.id,
        name: call.function.name,
        args,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn invoke(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .temperature(self.temperature)
            .messages(to_openai_messages(messages).map_err(classify)?);
        if !tools.is_empty() {
            args.tools(to_openai_tools(tools));
        }
        let request = args.build().map_err(classify)?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(classify)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let mut tool_calls = Vec::new();
        for call in message.tool_calls.unwrap_or_default() {
            match call {
                ChatCompletionMessageToolCalls::Function(call) => tool_calls.push(parse_call(call)?),
                ChatCompletionMessageToolCalls::Custom(custom) => {
                    tracing::warn!(call_id = %custom.id, "ignoring custom tool call");
                }
            }
        }

        Ok(ModelReply {
            content: message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_accepts_empty_arguments() {
        let call = ChatCompletionMessageToolCall {
            id: "call_1".into(),
            function: FunctionCall {
                name: "resetConfiguration".into(),
                arguments: String::new(),
            },
        };
        let parsed = parse_call(call).unwrap();
        assert_eq!(parsed.args, serde_json::json!({}));
    }

    #[test]
    fn test_parse_call_rejects_malformed_json() {
        let call = ChatCompletionMessageToolCall {
            id: "call_2".into(),
            function: FunctionCall {
                name: "setWingSpan".into(),
                arguments: "{wingSpan: ".into(),
            },
        };
        assert!(matches!(parse_call(call), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_assistant_tool_call_message_converts() {
        let mut msg = PromptMessage::assistant("");
        msg.tool_calls.push(ProposedCall {
            id: "call_3".into(),
            name: "retrieve".into(),
            args: serde_json::json!({"query": "range"}),
        });
        let converted = to_openai_messages(&[msg]).unwrap();
        match &converted[0] {
            ChatCompletionRequestMessage::Assistant(a) => {
                assert!(a.content.is_none());
                assert_eq!(a.tool_calls.as_ref().map(|c| c.len()), Some(1));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

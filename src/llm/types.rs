//! LLM 请求 / 响应类型（与具体后端无关）

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{Message, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
    Tool,
}

/// 发给模型的一条消息
#[derive(Clone, Debug, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
    /// 仅 Assistant：本条消息发起的工具调用
    pub tool_calls: Vec<ProposedCall>,
    /// 仅 Tool：对应的调用 id
    pub tool_call_id: Option<String>,
}

impl PromptMessage {
    fn plain(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(PromptRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(PromptRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(PromptRole::Assistant, content)
    }
}

/// 模型提议的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ProposedCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// 暴露给模型的工具定义（参数为 JSON Schema）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 模型一次调用的结果：文本 + 零或多个工具调用
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ProposedCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(calls: Vec<ProposedCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
        }
    }
}

/// 将持久化的消息窗口转换为模型消息
///
/// 保留工具调用与结果的配对：窗口开头若截到孤立的工具结果，予以丢弃。
pub fn prompt_window(messages: &[Message], window: usize) -> Vec<PromptMessage> {
    let start = messages.len().saturating_sub(window);
    let tail = &messages[start..];
    let first_valid = tail
        .iter()
        .position(|m| m.role != Role::Tool)
        .unwrap_or(tail.len());

    tail[first_valid..]
        .iter()
        .map(|m| match m.role {
            Role::User => PromptMessage::user(m.text()),
            Role::Assistant => {
                let mut p = PromptMessage::assistant(m.text());
                if let Some(call) = &m.tool_call {
                    p.tool_calls.push(ProposedCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        args: call.args.clone(),
                    });
                }
                p
            }
            Role::Tool => {
                let call_id = tail
                    .iter()
                    .find(|c| Some(&c.id) == m.tool_result_of.as_ref())
                    .and_then(|c| c.tool_call.as_ref())
                    .map(|c| c.id.clone());
                PromptMessage {
                    role: PromptRole::Tool,
                    content: m.text(),
                    tool_calls: Vec::new(),
                    tool_call_id: call_id,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MessageContent, ToolInvocation};

    #[test]
    fn test_prompt_window_drops_orphan_tool_results() {
        let call = Message::assistant_tool_call(ToolInvocation {
            id: "call_a".into(),
            name: "retrieve".into(),
            args: serde_json::json!({"query": "q"}),
        });
        let result = Message::tool_result(&call, MessageContent::Text("docs".into()));
        let messages = vec![
            Message::user("q"),
            call,
            result,
            Message::assistant("answer"),
            Message::user("next"),
        ];

        // 窗口 3 从工具结果开始，应被丢弃
        let window = prompt_window(&messages, 3);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, PromptRole::Assistant);
        assert_eq!(window[1].content, "next");
    }

    #[test]
    fn test_prompt_window_links_tool_call_ids() {
        let call = Message::assistant_tool_call(ToolInvocation {
            id: "call_b".into(),
            name: "setWingSpan".into(),
            args: serde_json::json!({"wingSpan": 3}),
        });
        let result = Message::tool_result(&call, MessageContent::Text("ok".into()));
        let window = prompt_window(&[Message::user("wings 3m"), call, result], 10);

        assert_eq!(window[1].tool_calls[0].id, "call_b");
        assert_eq!(window[2].tool_call_id.as_deref(), Some("call_b"));
    }
}

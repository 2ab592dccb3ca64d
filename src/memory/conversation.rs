//! 会话数据模型：Message / Thread
//!
//! 线程内消息按 sequence 全序、只追加；sequence 由 ConversationStore 在 append 时分配。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 消息内容：纯文本或结构化 JSON（工具结果）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MessageContent {
    Text(String),
    Structured(Value),
}

impl MessageContent {
    /// 渲染为文本；结构化内容序列化为紧凑 JSON
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Structured(v) => v.to_string(),
        }
    }
}

/// 助手消息上记录的工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// 模型给出的调用 id，工具结果消息通过它与调用配对
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolInvocation>,
    /// 工具结果所对应的助手消息 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_of: Option<String>,
    /// 0 表示尚未持久化
    #[serde(default)]
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            tool_call: None,
            tool_result_of: None,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(content.into()))
    }

    /// 只携带工具调用、无文本的助手消息
    pub fn assistant_tool_call(call: ToolInvocation) -> Self {
        let mut msg = Self::new(Role::Assistant, MessageContent::Text(String::new()));
        msg.tool_call = Some(call);
        msg
    }

    /// 工具结果消息，`call_message` 为发起调用的助手消息
    pub fn tool_result(call_message: &Message, content: MessageContent) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_result_of = Some(call_message.id.clone());
        msg
    }

    pub fn text(&self) -> String {
        self.content.as_text()
    }

    /// 对话消息：用户消息，或既非工具调用也非工具结果的助手消息
    pub fn is_conversational(&self) -> bool {
        match self.role {
            Role::User => true,
            Role::Assistant => self.tool_call.is_none(),
            Role::Tool => false,
        }
    }
}

/// 线程：按 sequence 排序的消息序列
#[derive(Clone, Debug, Default)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<Message>,
    pub last_write_seq: u64,
}

impl Thread {
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        let last_write_seq = messages.last().map(|m| m.sequence).unwrap_or(0);
        Self {
            id: id.into(),
            messages,
            last_write_seq,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 尾部 `window` 条对话消息（不含工具调用与工具结果）
    pub fn conversational_window(&self, window: usize) -> Vec<&Message> {
        let conversational: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.is_conversational())
            .collect();
        let skip = conversational.len().saturating_sub(window);
        conversational.into_iter().skip(skip).collect()
    }
}

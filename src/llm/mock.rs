//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预置回复，并记录每次调用的消息与工具列表；脚本耗尽后回显最后一条用户消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::types::{ModelReply, PromptMessage, PromptRole, ToolDefinition};
use crate::llm::{LlmClient, LlmError};

/// 一次被记录的调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<PromptMessage>,
    pub tool_names: Vec<String>,
}

/// 脚本化 Mock 客户端
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功回复
    pub fn push_reply(&self, reply: ModelReply) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(reply));
        }
        self
    }

    /// 追加一次失败
    pub fn push_error(&self, err: LlmError) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(
        &self,
        messages: &[PromptMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(next) = scripted {
            return next;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == PromptRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ModelReply::text(format!("Echo from Mock: {last_user}")))
    }
}

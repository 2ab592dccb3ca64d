//! Planner：决策步
//!
//! 拼接系统提示与尾部历史窗口，连同全部工具定义调用模型，返回模型给出的文本与工具调用提议。
//! 提议的取舍（优先级规则）由 `core::decision` 负责。

use std::path::Path;
use std::sync::Arc;

use crate::llm::{prompt_window, LlmClient, LlmError, ModelReply, PromptMessage, ToolDefinition};
use crate::memory::Message;

/// 内置决策提示
pub const DEFAULT_DECISION_PROMPT: &str = "You are an expert 3D drone configurator assistant. \
Your primary goal is to help users modify a drone model by calling the available functions.
RULES:
1. You MUST ONLY use a function if the user's request is a clear, direct, and unambiguous match for the function's description.
2. Do NOT force a function call if the user's intent is unclear or conversational.
3. When in doubt, or if no tool is a direct match, your default behavior MUST be to ask for clarification.
4. For questions about drones or the configurator, call the `retrieve` function.
5. Be concise in your responses.";

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    window: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            window: 10,
        }
    }

    /// 从文件读取系统提示；文件不存在或读取失败时使用内置提示
    pub fn from_prompt_file(llm: Arc<dyn LlmClient>, path: Option<&Path>) -> Self {
        let prompt = path
            .and_then(|p| match std::fs::read_to_string(p) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to read system prompt {}: {}", p.display(), e);
                    None
                }
            })
            .unwrap_or_else(|| DEFAULT_DECISION_PROMPT.to_string());
        Self::new(llm, prompt)
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// `history` 已包含本轮的用户消息
    pub fn build_prompt(&self, history: &[Message]) -> Vec<PromptMessage> {
        let mut prompt = vec![PromptMessage::system(self.system_prompt.clone())];
        prompt.extend(prompt_window(history, self.window));
        prompt
    }

    pub async fn propose(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<ModelReply, LlmError> {
        let prompt = self.build_prompt(history);
        self.llm.invoke(&prompt, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, PromptRole};

    #[tokio::test]
    async fn test_propose_sends_window_and_tools() {
        let mock = Arc::new(MockLlmClient::new());
        let planner = Planner::new(mock.clone(), "rules").with_window(2);
        let history = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        let tools = vec![ToolDefinition {
            name: "retrieve".into(),
            description: "d".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];

        let reply = planner.propose(&history, &tools).await.unwrap();
        assert_eq!(reply.content, "Echo from Mock: c");

        let calls = mock.calls();
        assert_eq!(calls[0].tool_names, vec!["retrieve"]);
        assert_eq!(calls[0].messages.len(), 3);
        assert_eq!(calls[0].messages[0].role, PromptRole::System);
        assert_eq!(calls[0].messages[1].content, "b");
    }

    #[test]
    fn test_missing_prompt_file_falls_back() {
        let planner = Planner::from_prompt_file(
            Arc::new(MockLlmClient::new()),
            Some(Path::new("/definitely/not/here.md")),
        );
        assert_eq!(planner.system_prompt(), DEFAULT_DECISION_PROMPT);
    }
}

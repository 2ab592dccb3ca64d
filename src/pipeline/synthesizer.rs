//! 回答合成
//!
//! 系统提示嵌入检索到的文档；再附上尾部若干条对话消息（不含工具调用 / 结果），调用一次模型。
//! 窗口外的消息不进入 prompt，但仍保留在持久化历史中。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError, PromptMessage};
use crate::memory::{Message, RetrievalAugmentor, RetrievedDocument, Role, Thread};

pub const GROUNDED_QA_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// 没有检索到上下文时追加的说明
pub const NO_CONTEXT_NOTE: &str = "No documentation was retrieved for this question. \
Do not make up an answer: tell the user that you don't know.";

pub struct ResponseSynthesizer {
    llm: Arc<dyn LlmClient>,
    window: usize,
}

impl ResponseSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, window: usize) -> Self {
        Self {
            llm,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn build_prompt(&self, thread: &Thread, docs: &[RetrievedDocument]) -> Vec<PromptMessage> {
        let system = if docs.is_empty() {
            format!("{GROUNDED_QA_PROMPT}\n\n{NO_CONTEXT_NOTE}")
        } else {
            format!("{GROUNDED_QA_PROMPT}\n\n{}", RetrievalAugmentor::render_context(docs))
        };

        let mut prompt = vec![PromptMessage::system(system)];
        prompt.extend(
            thread
                .conversational_window(self.window)
                .into_iter()
                .map(|m| match m.role {
                    Role::User => PromptMessage::user(m.text()),
                    _ => PromptMessage::assistant(m.text()),
                }),
        );
        prompt
    }

    /// 非流式调用一次模型，返回最终助手消息
    pub async fn synthesize(&self, thread: &Thread, docs: &[RetrievedDocument]) -> Result<Message, LlmError> {
        let prompt = self.build_prompt(thread, docs);
        let reply = self.llm.invoke(&prompt, &[]).await?;
        Ok(Message::assistant(reply.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelReply};
    use crate::memory::{MessageContent, ToolInvocation};

    fn doc(id: &str, text: &str) -> RetrievedDocument {
        RetrievedDocument {
            source_id: id.into(),
            content: text.into(),
            score: 1.0,
        }
    }

    #[test]
    fn test_prompt_embeds_context_and_skips_tool_messages() {
        let synth = ResponseSynthesizer::new(Arc::new(MockLlmClient::new()), 10);
        let call = Message::assistant_tool_call(ToolInvocation {
            id: "c1".into(),
            name: "retrieve".into(),
            args: serde_json::json!({"query": "flight time"}),
        });
        let result = Message::tool_result(&call, MessageContent::Text("raw".into()));
        let thread = Thread::new("t", vec![Message::user("What is flight time related to?"), call, result]);

        let prompt = synth.build_prompt(&thread, &[doc("battery.md", "Battery capacity.")]);
        assert_eq!(prompt.len(), 2);
        assert!(prompt[0].content.contains("Source: battery.md\nContent: Battery capacity."));
        assert!(!prompt[0].content.contains(NO_CONTEXT_NOTE));
    }

    #[test]
    fn test_prompt_without_docs_asks_for_dont_know() {
        let synth = ResponseSynthesizer::new(Arc::new(MockLlmClient::new()), 10);
        let prompt = synth.build_prompt(&Thread::new("t", vec![Message::user("q")]), &[]);
        assert!(prompt[0].content.contains("don't know"));
        assert!(prompt[0].content.contains(NO_CONTEXT_NOTE));
    }

    #[test]
    fn test_window_bounds_history() {
        let synth = ResponseSynthesizer::new(Arc::new(MockLlmClient::new()), 10);
        let messages: Vec<Message> = (0..30).map(|i| Message::user(format!("m{i}"))).collect();
        let prompt = synth.build_prompt(&Thread::new("t", messages), &[]);
        assert_eq!(prompt.len(), 11);
        assert_eq!(prompt[1].content, "m20");
    }

    #[tokio::test]
    async fn test_synthesize_returns_assistant_message() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_reply(ModelReply::text("Battery capacity and weight."));
        let synth = ResponseSynthesizer::new(mock.clone(), 10);

        let msg = synth
            .synthesize(&Thread::new("t", vec![Message::user("q")]), &[doc("a", "b")])
            .await
            .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "Battery capacity and weight.");
        assert!(mock.calls()[0].tool_names.is_empty());
    }
}

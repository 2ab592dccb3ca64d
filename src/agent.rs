//! 边界层：请求 / 响应 / 历史的 wire 类型与映射
//!
//! HTTP 与 REPL 都只做薄映射：请求 `{userInput, conversationId}`；响应为工具结果对象
//! `{name, args, message}` 或纯字符串；失败返回 `{error, kind}`。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{FailureKind, TurnError, TurnOutcome, TurnResult, TurnRouter};
use crate::memory::{Message, Role};
use crate::tools::DroneConfiguration;

/// 缺失字段按空串处理，由 `process_message` 统一报告
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub user_input: String,
    pub conversation_id: String,
}

/// 一轮的对外结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TurnResponse {
    Tool { name: String, args: Value, message: String },
    Text(String),
}

impl From<&TurnResult> for TurnResponse {
    fn from(result: &TurnResult) -> Self {
        match &result.outcome {
            TurnOutcome::Action { action, message } => TurnResponse::Tool {
                name: action.name().to_string(),
                args: action.args(),
                message: message.clone(),
            },
            other => TurnResponse::Text(other.message().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: TurnResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: FailureKind,
}

impl From<&TurnError> for ErrorResponse {
    fn from(err: &TurnError) -> Self {
        Self {
            error: err.user_message(),
            kind: err.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// "user" | "system"
    pub role: &'static str,
    pub content: String,
}

/// 对话历史 → wire 格式；工具调用与工具结果不出现
pub fn history_entries(messages: &[Message]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .filter(|m| m.is_conversational())
        .map(|m| HistoryEntry {
            role: if m.role == Role::User { "user" } else { "system" },
            content: m.text(),
        })
        .collect()
}

/// 处理一条请求：校验字段后交给路由器
pub async fn process_message(router: &TurnRouter, request: &ChatRequest) -> Result<TurnResponse, TurnError> {
    if request.conversation_id.trim().is_empty() {
        return Err(TurnError::InvalidRequest("conversationId is required".to_string()));
    }
    if request.user_input.trim().is_empty() {
        return Err(TurnError::InvalidRequest("userInput is required".to_string()));
    }
    let result = router
        .handle_turn(&request.conversation_id, &request.user_input)
        .await?;
    Ok(TurnResponse::from(&result))
}

/// REPL 一行输入的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReplOutput {
    Print(String),
    /// 失败提示；会话继续
    Error(String),
    Quit,
}

/// 命令行会话：当前线程与调用方持有的无人机配置
pub struct ReplSession {
    pub thread_id: String,
    pub drone: DroneConfiguration,
}

impl ReplSession {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            drone: DroneConfiguration::default(),
        }
    }

    /// `/history` `/reset` `/config` `/quit`，其余输入作为一轮对话
    pub async fn handle_line(&mut self, router: &TurnRouter, input: &str) -> ReplOutput {
        match input.trim() {
            "/quit" | "/exit" => ReplOutput::Quit,
            "/history" => match router.history(&self.thread_id).await {
                Ok(messages) => ReplOutput::Print(
                    history_entries(&messages)
                        .into_iter()
                        .map(|e| format!("[{}] {}", e.role, e.content))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                Err(e) => ReplOutput::Error(e.user_message()),
            },
            "/reset" => match router.delete_thread(&self.thread_id).await {
                Ok(()) => {
                    self.thread_id = uuid::Uuid::new_v4().to_string();
                    self.drone = DroneConfiguration::default();
                    ReplOutput::Print(format!("Started new thread {}", self.thread_id))
                }
                Err(e) => ReplOutput::Error(e.user_message()),
            },
            "/config" => match serde_json::to_string_pretty(&self.drone) {
                Ok(json) => ReplOutput::Print(json),
                Err(e) => ReplOutput::Error(e.to_string()),
            },
            text => match router.handle_turn(&self.thread_id, text).await {
                Ok(result) => {
                    if let TurnOutcome::Action { action, .. } = &result.outcome {
                        self.drone.apply(action);
                    }
                    ReplOutput::Print(result.outcome.message().to_string())
                }
                Err(e) => ReplOutput::Error(e.user_message()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MessageContent, ToolInvocation};
    use serde_json::json;

    #[test]
    fn test_request_uses_camel_case() {
        let req: ChatRequest =
            serde_json::from_value(json!({"userInput": "hi", "conversationId": "abc"})).unwrap();
        assert_eq!(req.user_input, "hi");
        assert_eq!(req.conversation_id, "abc");

        let partial: ChatRequest = serde_json::from_value(json!({"userInput": "hi"})).unwrap();
        assert!(partial.conversation_id.is_empty());
    }

    #[test]
    fn test_response_shapes() {
        let tool = TurnResponse::Tool {
            name: "setWingSpan".into(),
            args: json!({"wingSpan": 3.0}),
            message: "Wingspan set to 3 m.".into(),
        };
        assert_eq!(
            serde_json::to_value(ChatResponse { response: tool }).unwrap(),
            json!({"response": {"name": "setWingSpan", "args": {"wingSpan": 3.0}, "message": "Wingspan set to 3 m."}})
        );
        assert_eq!(
            serde_json::to_value(TurnResponse::Text("plain".into())).unwrap(),
            json!("plain")
        );
    }

    #[test]
    fn test_history_maps_roles_and_hides_tools() {
        let call = Message::assistant_tool_call(ToolInvocation {
            id: "c".into(),
            name: "retrieve".into(),
            args: json!({"query": "q"}),
        });
        let result = Message::tool_result(&call, MessageContent::Text("docs".into()));
        let entries = history_entries(&[Message::user("q"), call, result, Message::assistant("a")]);
        assert_eq!(
            entries,
            vec![
                HistoryEntry { role: "user", content: "q".into() },
                HistoryEntry { role: "system", content: "a".into() },
            ]
        );
    }

    #[test]
    fn test_error_response_is_generic() {
        let err = TurnError::Persistence(crate::memory::StoreError::Poisoned);
        let body = ErrorResponse::from(&err);
        assert_eq!(body.kind, FailureKind::Persistence);
        assert!(!body.error.contains("poisoned"));
    }

    mod repl {
        use std::sync::Arc;

        use async_trait::async_trait;

        use super::super::*;
        use crate::llm::{MockLlmClient, ModelReply, ProposedCall};
        use crate::memory::{ConversationStore, KeywordVectorStore, RetrievalAugmentor, StoreError};
        use crate::pipeline::{Planner, ResponseSynthesizer};
        use crate::tools::{DroneType, ToolDispatcher, ToolRegistry};
        use serde_json::json;

        /// 读写都失败的存储
        struct DownStore;

        #[async_trait]
        impl ConversationStore for DownStore {
            async fn append(&self, _: &str, _: Vec<Message>) -> Result<Vec<Message>, StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }

            async fn load(&self, _: &str) -> Result<Vec<Message>, StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }

            async fn delete_thread(&self, _: &str) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".into()))
            }
        }

        fn router(mock: Arc<MockLlmClient>, store: Arc<dyn ConversationStore>) -> TurnRouter {
            TurnRouter::new(
                store,
                Planner::new(mock.clone(), "rules"),
                ToolDispatcher::new(Arc::new(ToolRegistry::with_drone_catalog())),
                RetrievalAugmentor::new(Arc::new(KeywordVectorStore::new()), 2),
                ResponseSynthesizer::new(mock, 10),
            )
        }

        #[tokio::test]
        async fn test_store_failures_keep_session_alive() {
            let router = router(Arc::new(MockLlmClient::new()), Arc::new(DownStore));
            let mut session = ReplSession::new("t");

            let out = session.handle_line(&router, "/history").await;
            assert!(matches!(out, ReplOutput::Error(ref m) if m.contains("could not be saved")));

            let out = session.handle_line(&router, "/reset").await;
            assert!(matches!(out, ReplOutput::Error(_)));
            assert_eq!(session.thread_id, "t");

            assert_eq!(session.handle_line(&router, "/quit").await, ReplOutput::Quit);
        }

        #[tokio::test]
        async fn test_action_applied_and_reset_starts_new_thread() {
            let mock = Arc::new(MockLlmClient::new());
            mock.push_reply(ModelReply::with_calls(vec![ProposedCall::new(
                "setDroneType",
                json!({"type": "Rotary-wing"}),
            )]));
            let router = router(mock, Arc::new(crate::memory::InMemoryStore::new()));
            let mut session = ReplSession::new("t");

            let out = session.handle_line(&router, "rotary please").await;
            assert_eq!(out, ReplOutput::Print("Switched the drone model to Rotary-wing.".into()));
            assert_eq!(session.drone.drone_type, DroneType::RotaryWing);

            let out = session.handle_line(&router, "/reset").await;
            assert!(matches!(out, ReplOutput::Print(ref m) if m.starts_with("Started new thread")));
            assert_ne!(session.thread_id, "t");
            assert_eq!(session.drone, DroneConfiguration::default());
        }
    }
}

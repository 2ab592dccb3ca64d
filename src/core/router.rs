//! 轮次路由器
//!
//! handle_turn：加载线程 → 决策 → {工具调度 | 检索 + 合成 | 直接回复} → 一次性 append。
//! 任何不可恢复的错误都会中止轮次，且不写入任何消息；参数校验失败同样不写入。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::decision::{self, Decision, Resolution};
use crate::core::error::TurnError;
use crate::core::session_supervisor::{SessionSupervisor, TurnGuard};
use crate::core::state::{PhaseTracker, TurnPhase};
use crate::llm::{ProposedCall, ToolDefinition};
use crate::memory::{
    ConversationStore, Message, MessageContent, RetrievalAugmentor, RetrievedDocument, Thread, ToolInvocation,
};
use crate::pipeline::{Planner, ResponseSynthesizer};
use crate::tools::{DroneAction, ToolCall, ToolDispatcher, ValidationError, RETRIEVE_TOOL};

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    ToolDispatch,
    RetrieveSynthesize,
    Respond,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// 决策步的文本回复
    Model,
    /// 检索后合成，`documents` 为使用的文档数（可能为 0）
    Retrieval { documents: usize },
}

/// 一轮的结果
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    /// 已校验的配置动作，由调用方执行
    Action { action: DroneAction, message: String },
    /// 工具参数未通过校验
    Rejected {
        tool: String,
        error: ValidationError,
        message: String,
    },
    Answer { text: String, source: AnswerSource },
}

impl TurnOutcome {
    pub fn message(&self) -> &str {
        match self {
            TurnOutcome::Action { message, .. } | TurnOutcome::Rejected { message, .. } => message,
            TurnOutcome::Answer { text, .. } => text,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnResult {
    pub thread_id: String,
    pub outcome: TurnOutcome,
    pub route: Route,
    pub phases: Vec<TurnPhase>,
    /// 按优先级规则丢弃的调用数；调用名只进日志
    pub discarded_calls: usize,
    /// 本轮写入的消息（已分配 sequence）；校验失败时为空
    pub persisted: Vec<Message>,
}

pub struct TurnRouter {
    store: Arc<dyn ConversationStore>,
    planner: Planner,
    dispatcher: ToolDispatcher,
    augmentor: RetrievalAugmentor,
    synthesizer: ResponseSynthesizer,
    supervisor: SessionSupervisor,
    turn_timeout: Duration,
}

impl TurnRouter {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        planner: Planner,
        dispatcher: ToolDispatcher,
        augmentor: RetrievalAugmentor,
        synthesizer: ResponseSynthesizer,
    ) -> Self {
        Self {
            store,
            planner,
            dispatcher,
            augmentor,
            synthesizer,
            supervisor: SessionSupervisor::new(),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    /// 决策步下发的工具：配置工具 + retrieve
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.dispatcher.registry().definitions()
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.token_usage()
    }

    pub async fn handle_turn(&self, thread_id: &str, user_text: &str) -> Result<TurnResult, TurnError> {
        self.handle_turn_with_cancel(thread_id, user_text, self.supervisor.child_token())
            .await
    }

    /// `cancel` 被取消或超过轮次时限时中止，不写入任何消息
    pub async fn handle_turn_with_cancel(
        &self,
        thread_id: &str,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnResult, TurnError> {
        if thread_id.trim().is_empty() {
            return Err(TurnError::InvalidRequest("conversation id is empty".to_string()));
        }
        if user_text.trim().is_empty() {
            return Err(TurnError::InvalidRequest("user input is empty".to_string()));
        }

        let guard = TurnGuard::new(cancel, self.turn_timeout);
        let span = tracing::info_span!("turn", thread_id = %thread_id);
        let result = self
            .run_turn(thread_id, user_text, &guard)
            .instrument(span.clone())
            .await;

        if let Err(e) = &result {
            span.in_scope(|| tracing::error!(kind = ?e.kind(), error = %e, "turn aborted"));
        }
        result
    }

    async fn run_turn(&self, thread_id: &str, user_text: &str, guard: &TurnGuard) -> Result<TurnResult, TurnError> {
        let mut phases = PhaseTracker::new();

        let mut working = guard.run(self.store.load(thread_id)).await??;
        let user = Message::user(user_text);
        working.push(user.clone());

        phases.advance(TurnPhase::ModelDecision);
        let definitions = self.tool_definitions();
        let reply = guard.run(self.planner.propose(&working, &definitions)).await??;

        let Resolution { decision, discarded } = decision::resolve(reply, user_text, self.dispatcher.registry());
        let discarded_calls = discarded.len();
        if discarded_calls > 0 {
            let names: Vec<&str> = discarded.iter().map(|c| c.name.as_str()).collect();
            tracing::warn!(discarded = ?names, "dropping extra proposed tool calls");
        }

        let mut batch = vec![user];
        let (outcome, route) = match decision {
            Decision::Dispatch(call) => {
                phases.advance(TurnPhase::ToolDispatch);
                (self.dispatch(call, &mut batch), Route::ToolDispatch)
            }
            Decision::Retrieve { query, call } => {
                phases.advance(TurnPhase::Retrieve);
                let docs = self.retrieve(&query, guard).await?;

                let call_message = Message::assistant_tool_call(ToolInvocation {
                    id: call
                        .map(|c| c.id)
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: RETRIEVE_TOOL.to_string(),
                    args: json!({ "query": query }),
                });
                let result_message = Message::tool_result(&call_message, MessageContent::Structured(documents_json(&docs)));

                phases.advance(TurnPhase::Synthesize);
                let thread = Thread::new(thread_id, working);
                let answer = guard.run(self.synthesizer.synthesize(&thread, &docs)).await??;
                let text = answer.text();
                batch.extend([call_message, result_message, answer]);
                (
                    TurnOutcome::Answer {
                        text,
                        source: AnswerSource::Retrieval { documents: docs.len() },
                    },
                    Route::RetrieveSynthesize,
                )
            }
            Decision::Respond(text) => {
                phases.advance(TurnPhase::Respond);
                batch.push(Message::assistant(text.clone()));
                (
                    TurnOutcome::Answer {
                        text,
                        source: AnswerSource::Model,
                    },
                    Route::Respond,
                )
            }
        };
        phases.advance(TurnPhase::Done);

        let persisted = if matches!(outcome, TurnOutcome::Rejected { .. }) {
            Vec::new()
        } else {
            guard.check()?;
            self.store.append(thread_id, batch).await?
        };

        tracing::info!(route = ?route, persisted = persisted.len(), "turn done");
        Ok(TurnResult {
            thread_id: thread_id.to_string(),
            outcome,
            route,
            phases: phases.visited().to_vec(),
            discarded_calls,
            persisted,
        })
    }

    fn dispatch(&self, call: ProposedCall, batch: &mut Vec<Message>) -> TurnOutcome {
        let tool_call = ToolCall::new(call.name.clone(), call.args.clone());
        match self.dispatcher.dispatch(&tool_call) {
            Ok(validated) => {
                let message = validated.action.confirmation();
                let call_message = Message::assistant_tool_call(ToolInvocation {
                    id: call.id,
                    name: call.name,
                    args: Value::Object(validated.args),
                });
                let result_message = Message::tool_result(
                    &call_message,
                    MessageContent::Structured(json!({ "ok": true, "action": validated.action })),
                );
                batch.extend([call_message, result_message, Message::assistant(message.clone())]);
                TurnOutcome::Action {
                    action: validated.action,
                    message,
                }
            }
            Err(error) => {
                let message = format!("I couldn't apply `{}`: {}", call.name, error);
                TurnOutcome::Rejected {
                    tool: call.name,
                    error,
                    message,
                }
            }
        }
    }

    /// 检索失败降级为空上下文；取消与超时仍中止轮次
    async fn retrieve(&self, query: &str, guard: &TurnGuard) -> Result<Vec<RetrievedDocument>, TurnError> {
        match guard.run(self.augmentor.retrieve(query, self.augmentor.k())).await? {
            Ok(docs) => Ok(docs),
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, answering without context");
                Ok(Vec::new())
            }
        }
    }

    /// 对话历史：不含工具调用与工具结果
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Message>, TurnError> {
        let messages = self.store.load(thread_id).await?;
        Ok(messages
            .into_iter()
            .filter(|m| m.is_conversational() && !m.text().is_empty())
            .collect())
    }

    /// 删除线程（幂等）
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), TurnError> {
        self.store.delete_thread(thread_id).await?;
        tracing::info!(thread_id = %thread_id, "thread deleted");
        Ok(())
    }
}

fn documents_json(docs: &[RetrievedDocument]) -> Value {
    Value::Array(
        docs.iter()
            .map(|d| json!({ "source": d.source_id, "content": d.content, "score": d.score }))
            .collect(),
    )
}

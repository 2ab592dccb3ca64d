//! 决策取舍：把模型的一次回复归约为恰好一个动作
//!
//! 优先级规则：提议中含 `retrieve` 时只保留它；否则保留第一个非检索调用；其余调用丢弃，
//! 只记录日志，绝不改写成文本。没有调用时，非空文本直接作为回复，空文本按检索处理。

use crate::llm::{ModelReply, ProposedCall};
use crate::tools::{ToolRegistry, RETRIEVE_TOOL};

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// 交给调度器校验的配置工具调用
    Dispatch(ProposedCall),
    /// 检索后合成；`call` 为空表示由空回复触发
    Retrieve {
        query: String,
        call: Option<ProposedCall>,
    },
    Respond(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub decision: Decision,
    pub discarded: Vec<ProposedCall>,
}

/// 检索查询：优先取校验通过的 `query`，否则退回用户原文
fn retrieve_query(call: &ProposedCall, user_text: &str, registry: &ToolRegistry) -> String {
    registry
        .retrieve_schema()
        .validate(&call.args)
        .ok()
        .and_then(|args| args.get("query").and_then(|q| q.as_str()).map(str::to_string))
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| user_text.to_string())
}

pub fn resolve(reply: ModelReply, user_text: &str, registry: &ToolRegistry) -> Resolution {
    let mut calls = reply.tool_calls;

    if let Some(pos) = calls.iter().position(|c| c.name == RETRIEVE_TOOL) {
        let call = calls.remove(pos);
        return Resolution {
            decision: Decision::Retrieve {
                query: retrieve_query(&call, user_text, registry),
                call: Some(call),
            },
            discarded: calls,
        };
    }

    if !calls.is_empty() {
        let first = calls.remove(0);
        return Resolution {
            decision: Decision::Dispatch(first),
            discarded: calls,
        };
    }

    let decision = if reply.content.trim().is_empty() {
        Decision::Retrieve {
            query: user_text.to_string(),
            call: None,
        }
    } else {
        Decision::Respond(reply.content)
    };
    Resolution {
        decision,
        discarded: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> ProposedCall {
        ProposedCall::new(name, args)
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_drone_catalog()
    }

    #[test]
    fn test_retrieve_wins_over_tool_calls() {
        let reply = ModelReply::with_calls(vec![
            call("setDroneType", json!({"type": "Rotary-wing"})),
            call(RETRIEVE_TOOL, json!({"query": "rotor efficiency"})),
        ]);
        let r = resolve(reply, "user text", &registry());
        assert!(matches!(r.decision, Decision::Retrieve { ref query, .. } if query == "rotor efficiency"));
        assert_eq!(r.discarded.len(), 1);
        assert_eq!(r.discarded[0].name, "setDroneType");
    }

    #[test]
    fn test_first_tool_call_kept() {
        let reply = ModelReply::with_calls(vec![
            call("setWingSpan", json!({"wingSpan": 3})),
            call("setDroneType", json!({"type": "Fixed-wing"})),
        ]);
        let r = resolve(reply, "x", &registry());
        assert!(matches!(r.decision, Decision::Dispatch(ref c) if c.name == "setWingSpan"));
        assert_eq!(r.discarded.len(), 1);
    }

    #[test]
    fn test_text_reply_responds() {
        let r = resolve(ModelReply::text("Could you clarify?"), "x", &registry());
        assert_eq!(r.decision, Decision::Respond("Could you clarify?".into()));
        assert!(r.discarded.is_empty());
    }

    #[test]
    fn test_empty_reply_retrieves_user_text() {
        let r = resolve(ModelReply::text("  "), "What is flight time related to?", &registry());
        assert_eq!(
            r.decision,
            Decision::Retrieve {
                query: "What is flight time related to?".into(),
                call: None
            }
        );
    }

    #[test]
    fn test_bad_retrieve_args_fall_back_to_user_text() {
        let reply = ModelReply::with_calls(vec![call(RETRIEVE_TOOL, json!({"q": 1}))]);
        let r = resolve(reply, "original question", &registry());
        assert!(matches!(r.decision, Decision::Retrieve { ref query, .. } if query == "original question"));
    }
}

//! 轮次错误与失败分类
//!
//! 所有外部调用失败在路由器边界被归入 TurnError；中止的轮次不会留下任何持久化写入。
//! ValidationError / RetrievalError 不在此列：前者成为助手消息，后者降级为空上下文。

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::StoreError;

/// 导致轮次中止的错误
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Model invocation failed: {0}")]
    ModelInvocation(#[from] LlmError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Turn timed out after {0:?}")]
    Timeout(Duration),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// 稳定的失败类别，供边界层映射状态码
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ModelInvocation,
    Persistence,
    Timeout,
    Cancelled,
    InvalidRequest,
}

impl TurnError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TurnError::ModelInvocation(_) => FailureKind::ModelInvocation,
            TurnError::Persistence(_) => FailureKind::Persistence,
            TurnError::Timeout(_) => FailureKind::Timeout,
            TurnError::Cancelled => FailureKind::Cancelled,
            TurnError::InvalidRequest(_) => FailureKind::InvalidRequest,
        }
    }

    /// 面向用户的通用提示（不泄露内部细节）
    pub fn user_message(&self) -> String {
        match self {
            TurnError::ModelInvocation(_) => {
                "The assistant is unavailable right now. Please try again.".to_string()
            }
            TurnError::Persistence(_) => {
                "The conversation could not be saved. Nothing was changed.".to_string()
            }
            TurnError::Timeout(d) => format!("The request took longer than {}s and was aborted.", d.as_secs()),
            TurnError::Cancelled => "The request was cancelled.".to_string(),
            TurnError::InvalidRequest(reason) => format!("Invalid request: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_messages() {
        let err = TurnError::from(LlmError::Timeout);
        assert_eq!(err.kind(), FailureKind::ModelInvocation);
        assert!(!err.user_message().contains("timed out"));

        let err = TurnError::Timeout(Duration::from_secs(90));
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.user_message().contains("90s"));

        assert_eq!(
            serde_json::to_value(FailureKind::InvalidRequest).unwrap(),
            serde_json::json!("invalid_request")
        );
    }
}

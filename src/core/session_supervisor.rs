//! 会话监管：取消与超时
//!
//! SessionSupervisor 持有根 CancellationToken（进程关闭时取消）；每个轮次拿到一个 TurnGuard，
//! 其子 token 与截止时间包住模型、检索、加载三类外部调用。最终 append 不经过 guard。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::error::TurnError;

#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 取消全部进行中的轮次
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    pub fn turn_guard(&self, timeout: Duration) -> TurnGuard {
        TurnGuard::new(self.child_token(), timeout)
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 单轮的取消 token 与截止时间
#[derive(Debug, Clone)]
pub struct TurnGuard {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl TurnGuard {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// 在取消 / 超时约束下等待 `fut`
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TurnError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TurnError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(TurnError::Timeout(self.timeout)),
            out = fut => Ok(out),
        }
    }

    /// append 前的最后检查
    pub fn check(&self) -> Result<(), TurnError> {
        if self.token.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(TurnError::Timeout(self.timeout));
        }
        Ok(())
    }
}

//! 核心编排层：轮次路由、决策取舍、状态机、取消与超时、错误分类、组装

pub mod builder;
pub mod decision;
pub mod error;
pub mod router;
pub mod session_supervisor;
pub mod state;

pub use builder::{create_copilot_builder, create_llm_from_config, CopilotBuilder};
pub use decision::{resolve, Decision, Resolution};
pub use error::{FailureKind, TurnError};
pub use router::{AnswerSource, Route, TurnOutcome, TurnResult, TurnRouter, DEFAULT_TURN_TIMEOUT};
pub use session_supervisor::{SessionSupervisor, TurnGuard};
pub use state::{PhaseTracker, TurnPhase};

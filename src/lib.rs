//! Drone Copilot - 自然语言驱动的参数化无人机配置助手
//!
//! 模块划分：
//! - **agent**: 边界层 wire 类型（请求 / 响应 / 历史）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 轮次路由、决策取舍、状态机、取消与超时、组装
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入
//! - **memory**: 会话数据模型、检查点存储、检索增强
//! - **pipeline**: 决策与回答合成两次模型调用
//! - **tools**: 工具 schema、注册表、无人机动作与调度器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod tools;

pub use crate::core::{CopilotBuilder, TurnError, TurnOutcome, TurnResult, TurnRouter};

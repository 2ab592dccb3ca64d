//! 轮次流水线的两次模型调用：决策（planner）与合成（synthesizer）

pub mod planner;
pub mod synthesizer;

pub use planner::{Planner, DEFAULT_DECISION_PROMPT};
pub use synthesizer::{ResponseSynthesizer, GROUNDED_QA_PROMPT, NO_CONTEXT_NOTE};

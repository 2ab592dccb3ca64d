//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use deepseek::{create_deepseek_client, deepseek_api_key, deepseek_model, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::{MockLlmClient, RecordedCall};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
pub use types::{prompt_window, ModelReply, PromptMessage, PromptRole, ProposedCall, ToolDefinition};

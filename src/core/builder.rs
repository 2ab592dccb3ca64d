//! Copilot 构建器：一次性组装模型客户端、会话存储、向量库与工具注册表
//!
//! 所有依赖都显式注入 TurnRouter，不存在模块级全局状态；测试可用 with_* 替换任意组件。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::router::TurnRouter;
use crate::llm::{
    create_deepseek_client, create_embedder_from_config, deepseek_api_key, deepseek_model, LlmClient, MockLlmClient,
    OpenAiClient,
};
use crate::memory::{
    ConversationStore, InMemoryStore, InMemoryVectorStore, KeywordVectorStore, RetrievalAugmentor,
    SqliteCheckpointStore, StoreError, VectorStore,
};
use crate::pipeline::{Planner, ResponseSynthesizer};
use crate::tools::{ToolDispatcher, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using scripted mock LLM");
        return Arc::new(MockLlmClient::new());
    }

    let has_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok();
    let use_deepseek = (provider == "deepseek" && (has_deepseek || has_openai)) || (has_deepseek && !has_openai);
    let use_openai = has_openai && provider != "deepseek";
    let timeout = Duration::from_secs(cfg.llm.timeouts.request);

    if use_deepseek {
        let model = deepseek_model(Some(&cfg.llm.model), std::env::var("DEEPSEEK_MODEL").ok().as_deref());
        let api_key = deepseek_api_key().unwrap_or_default();
        let client = create_deepseek_client(&model, &api_key)
            .with_temperature(cfg.llm.temperature)
            .with_request_timeout(timeout);
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(client)
    } else if use_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(
            OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None)
                .with_temperature(cfg.llm.temperature)
                .with_request_timeout(timeout),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

pub struct CopilotBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn ConversationStore>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    registry: Option<ToolRegistry>,
    system_prompt: Option<String>,
}

impl CopilotBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            store: None,
            vector_store: None,
            registry: None,
            system_prompt: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        self.llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config))
    }

    /// 会话存储：sqlite（默认）/ sqlite-async（需 async-sqlite feature）/ memory
    pub async fn build_store(&self) -> Result<Arc<dyn ConversationStore>, StoreError> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        let cfg = &self.config.store;
        match cfg.backend.as_str() {
            "memory" => Ok(Arc::new(InMemoryStore::new())),
            "sqlite" => {
                tracing::info!("Conversation store: {}", cfg.path.display());
                Ok(Arc::new(SqliteCheckpointStore::open(&cfg.path)?))
            }
            #[cfg(feature = "async-sqlite")]
            "sqlite-async" => {
                if let Some(parent) = cfg.path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
                }
                Ok(Arc::new(crate::memory::AsyncSqliteCheckpointStore::new(&cfg.path).await?))
            }
            other => {
                tracing::warn!("Unknown store backend `{}`, using in-memory store", other);
                Ok(Arc::new(InMemoryStore::new()))
            }
        }
    }

    /// 向量库：有嵌入服务时用嵌入 + 余弦，否则退回关键词检索；语料加载失败只告警
    pub async fn build_vector_store(&self) -> Arc<dyn VectorStore> {
        if let Some(store) = &self.vector_store {
            return store.clone();
        }
        let cfg = &self.config.retrieval;
        let embedder = create_embedder_from_config(self.config.llm.base_url.as_deref(), &cfg.embedding_model, None);

        match embedder {
            Some(embedder) => {
                let store = InMemoryVectorStore::new(embedder, cfg.max_entries);
                if let Some(path) = &cfg.corpus_path {
                    match store.load_corpus(path).await {
                        Ok(n) => tracing::info!("Indexed {} documents from {}", n, path.display()),
                        Err(e) => tracing::warn!("Corpus load failed: {}", e),
                    }
                }
                Arc::new(store)
            }
            None => {
                let store = KeywordVectorStore::new();
                if let Some(path) = &cfg.corpus_path {
                    match store.load_corpus(path).await {
                        Ok(n) => tracing::info!("Indexed {} documents (keyword) from {}", n, path.display()),
                        Err(e) => tracing::warn!("Corpus load failed: {}", e),
                    }
                }
                Arc::new(store)
            }
        }
    }

    pub async fn build(self) -> Result<TurnRouter, StoreError> {
        let llm = self.build_llm();
        let store = self.build_store().await?;
        let vector_store = self.build_vector_store().await;
        let turn = &self.config.turn;

        let planner = match &self.system_prompt {
            Some(prompt) => Planner::new(llm.clone(), prompt.clone()),
            None => Planner::from_prompt_file(llm.clone(), self.config.app.system_prompt_path.as_deref()),
        }
        .with_window(turn.decision_window);

        let registry = self.registry.unwrap_or_else(ToolRegistry::with_drone_catalog);

        Ok(TurnRouter::new(
            store,
            planner,
            ToolDispatcher::new(Arc::new(registry)),
            RetrievalAugmentor::new(vector_store, self.config.retrieval.k),
            ResponseSynthesizer::new(llm, turn.synthesis_window),
        )
        .with_turn_timeout(Duration::from_secs(turn.timeout_secs)))
    }
}

/// 从默认路径（或显式路径）加载配置并创建构建器；配置加载失败时使用默认值
pub fn create_copilot_builder(config_path: Option<PathBuf>) -> CopilotBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    CopilotBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ModelReply;

    #[tokio::test]
    async fn test_build_with_memory_backend() {
        let mut config = AppConfig::default();
        config.store.backend = "memory".to_string();
        config.llm.provider = "mock".to_string();

        let mock = Arc::new(MockLlmClient::new());
        mock.push_reply(ModelReply::text("hi"));
        let router = CopilotBuilder::new(config)
            .with_llm(mock)
            .with_vector_store(Arc::new(KeywordVectorStore::new()))
            .build()
            .await
            .unwrap();

        let result = router.handle_turn("t", "hello").await.unwrap();
        assert_eq!(result.outcome.message(), "hi");
        assert_eq!(router.tool_definitions().len(), 9);
    }

    #[tokio::test]
    async fn test_sqlite_backend_opens_in_tempdir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.store.path = dir.path().join("nested").join("conv.db");

        let store = CopilotBuilder::new(config).build_store().await.unwrap();
        assert!(store.load("nothing").await.unwrap().is_empty());
    }

    #[test]
    fn test_mock_provider_selected_explicitly() {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        let llm = create_llm_from_config(&config);
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }
}

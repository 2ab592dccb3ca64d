//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COPILOT__*` 覆盖（双下划线表示嵌套，如 `COPILOT__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub turn: TurnSection,
}

/// [app] 段：应用名、决策提示词文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 替换内置决策提示词的文件路径
    pub system_prompt_path: Option<PathBuf>,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock；实际选择还取决于 API Key 是否存在
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: 0.0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [retrieval] 段：Top-K、嵌入模型、语料文件
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// 预切分文档（JSON 数组 `[{source, content}]`），启动时载入向量库
    pub corpus_path: Option<PathBuf>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            k: default_k(),
            embedding_model: default_embedding_model(),
            corpus_path: None,
            max_entries: default_max_entries(),
        }
    }
}

fn default_k() -> usize {
    2
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_max_entries() -> usize {
    10_000
}

/// [store] 段：会话检查点后端
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// sqlite / memory
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/conversations.db")
}

/// [turn] 段：单轮超时与两个历史窗口
#[derive(Debug, Clone, Deserialize)]
pub struct TurnSection {
    #[serde(default = "default_turn_timeout")]
    pub timeout_secs: u64,
    /// 决策调用时携带的尾部历史条数
    #[serde(default = "default_window")]
    pub decision_window: usize,
    /// 合成回答时携带的对话消息条数（不含工具消息）
    #[serde(default = "default_window")]
    pub synthesis_window: usize,
}

impl Default for TurnSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_turn_timeout(),
            decision_window: default_window(),
            synthesis_window: default_window(),
        }
    }
}

fn default_turn_timeout() -> u64 {
    90
}

fn default_window() -> usize {
    10
}

/// 从 config 目录加载配置，环境变量 COPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COPILOT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.retrieval.k, 2);
        assert_eq!(cfg.turn.synthesis_window, 10);
        assert_eq!(cfg.turn.decision_window, 10);
        assert_eq!(cfg.store.backend, "sqlite");
        assert_eq!(cfg.llm.timeouts.request, 60);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[retrieval]\nk = 4\n\n[store]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.retrieval.k, 4);
        assert_eq!(cfg.store.backend, "memory");
        assert_eq!(cfg.turn.timeout_secs, 90);
    }
}

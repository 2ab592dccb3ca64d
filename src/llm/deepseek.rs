//! DeepSeek 后端：OpenAI 兼容接口上的决策 / 合成客户端
//!
//! 配置中的 `llm.model` 常是 OpenAI 模型名，DeepSeek 端点不认，需要换成 deepseek-* 模型。

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 选择模型：配置中的 deepseek-* 名称 > `override_model` > deepseek-chat
pub fn deepseek_model(configured: Option<&str>, override_model: Option<&str>) -> String {
    configured
        .filter(|m| m.starts_with("deepseek"))
        .or(override_model)
        .unwrap_or(DEEPSEEK_CHAT)
        .to_string()
}

/// `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
pub fn deepseek_api_key() -> Option<String> {
    std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
}

pub fn create_deepseek_client(model: &str, api_key: &str) -> OpenAiClient {
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), model, Some(api_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_model_name_replaced() {
        assert_eq!(deepseek_model(Some("gpt-4.1-mini"), None), DEEPSEEK_CHAT);
        assert_eq!(deepseek_model(Some("gpt-4.1-mini"), Some("deepseek-reasoner")), "deepseek-reasoner");
    }

    #[test]
    fn test_configured_deepseek_model_kept() {
        assert_eq!(deepseek_model(Some("deepseek-reasoner"), Some("other")), "deepseek-reasoner");
        let client = create_deepseek_client(&deepseek_model(None, None), "sk-test");
        assert_eq!(client.model(), DEEPSEEK_CHAT);
    }
}

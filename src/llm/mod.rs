//! 聊天模型抽象与实现
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 ChatModel；create_chat_model 按配置与
//! 环境变量选择后端。

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockChatModel;
pub use openai::OpenAiChat;
pub use traits::{AssistantReply, ChatModel, ToolSpec};

use crate::config::AppConfig;

/// 根据配置与环境变量创建模型实例；无 API Key 时回退到 Mock
pub fn create_chat_model(cfg: &AppConfig, model: &str) -> Arc<dyn ChatModel> {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("Using OpenAI-compatible chat model ({})", model);
        Arc::new(OpenAiChat::new(
            cfg.llm.base_url.as_deref(),
            model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("OPENAI_API_KEY not set, using Mock chat model");
        Arc::new(MockChatModel::echo())
    }
}

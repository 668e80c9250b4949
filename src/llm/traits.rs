//! 聊天模型抽象
//!
//! complete 接收治理指令、消息历史与可用工具声明，返回文字回复或一批工具调用请求。
//! 传输层错误以 String 返回，由调用方映射为 ReasoningFailure。

use async_trait::async_trait;

use crate::memory::{Message, ToolRequest};

/// 绑定给模型的工具声明（名称、描述、参数 JSON Schema）
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 模型一次补全的产物
#[derive(Clone, Debug)]
pub enum AssistantReply {
    /// 最终回答或向用户提问
    Text(String),
    /// 一个或多个带 id 的工具调用请求
    ToolRequests(Vec<ToolRequest>),
}

/// 聊天模型 trait：instructions 作为首条 system；tools 为空时模型只能以文字回复
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        instructions: Option<&str>,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, String>;
}

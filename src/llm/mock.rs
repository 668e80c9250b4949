//! Mock 聊天模型（用于测试，无需 API）
//!
//! 按序弹出预设回复；脚本耗尽后回显最后一条用户消息。complete 时记录收到的指令，
//! 便于测试断言提示词内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{AssistantReply, ChatModel, ToolSpec};
use crate::memory::Message;

/// 脚本化 Mock 模型
#[derive(Default)]
pub struct MockChatModel {
    script: Mutex<VecDeque<AssistantReply>>,
    seen_instructions: Mutex<Vec<String>>,
}

impl MockChatModel {
    pub fn scripted(replies: Vec<AssistantReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            seen_instructions: Mutex::new(Vec::new()),
        }
    }

    /// 无脚本：始终回显
    pub fn echo() -> Self {
        Self::default()
    }

    /// 历次调用收到的指令快照
    pub fn instructions_seen(&self) -> Vec<String> {
        self.seen_instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        instructions: Option<&str>,
        history: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantReply, String> {
        self.seen_instructions
            .lock()
            .unwrap()
            .push(instructions.unwrap_or_default().to_string());

        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return Ok(reply);
        }

        let last_user = history
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User(u) => Some(u.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");
        Ok(AssistantReply::Text(format!("Echo: {}", last_user)))
    }
}

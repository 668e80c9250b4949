//! 会话历史：消息日志与指令槽
//!
//! Message 为追加式日志中的消息变体。治理指令（system 语义）不进日志，而是保存在
//! Conversation 的独立可变槽位，渲染时解析为首条 system 消息；set_instructions 为
//! 幂等 upsert，结构上保证「每轮至多一条生效指令」。

use serde::{Deserialize, Serialize};

/// 助手发出的单个工具调用请求；id 用于与结果关联
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// 单个工具调用的结果；request_id 对应 ToolRequest.id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub request_id: String,
    pub tool: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(request_id: impl Into<String>, tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            tool: tool.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(request_id: impl Into<String>, tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            tool: tool.into(),
            content: format!("Error: {}", reason.into()),
            is_error: true,
        }
    }
}

/// 对话消息变体
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    /// 用户输入
    User(String),
    /// 助手的文字回复（最终回答或向用户提问）
    AgentText(String),
    /// 助手请求执行一个或多个工具
    AgentToolRequest(Vec<ToolRequest>),
    /// 工具执行结果
    ToolResult(ToolOutcome),
    /// 评估者反馈（Evaluator 节点追加）
    Evaluator(String),
}

impl Message {
    pub fn is_tool_request(&self) -> bool {
        matches!(self, Message::AgentToolRequest(_))
    }
}

/// 追加式消息日志 + 可变指令槽
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    instructions: Option<String>,
    entries: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.entries.push(msg);
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// upsert 治理指令：已有则覆盖，未有则设置
    pub fn set_instructions(&mut self, text: impl Into<String>) {
        self.instructions = Some(text.into());
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// 最近一条助手文字回复
    pub fn last_agent_text(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|m| match m {
            Message::AgentText(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// 最近一条评估者反馈
    pub fn last_evaluator_feedback(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|m| match m {
            Message::Evaluator(f) => Some(f.as_str()),
            _ => None,
        })
    }

    /// 渲染为线性转写，供评估者阅读。
    /// 用户行与助手行前缀区分；仅含工具调用的助手轮渲染为占位标记；工具结果不进转写。
    pub fn transcript(&self) -> String {
        let mut out = String::from("Conversation history:\n\n");
        for msg in &self.entries {
            match msg {
                Message::User(u) => {
                    out.push_str(&format!("User: {}\n", u));
                }
                Message::AgentText(t) => {
                    out.push_str(&format!("Assistant: {}\n", t));
                }
                Message::AgentToolRequest(_) => {
                    out.push_str("Assistant: [tool use]\n");
                }
                Message::Evaluator(f) => {
                    out.push_str(&format!("Evaluator feedback: {}\n", f));
                }
                Message::ToolResult(_) => {}
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_instructions_overwrites_in_place() {
        let mut conv = Conversation::new();
        conv.push(Message::User("hi".into()));
        conv.set_instructions("first");
        conv.set_instructions("second");
        assert_eq!(conv.instructions(), Some("second"));
        // 日志本身不包含指令消息
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn transcript_marks_tool_only_turns() {
        let mut conv = Conversation::new();
        conv.push(Message::User("find the capital".into()));
        conv.push(Message::AgentToolRequest(vec![ToolRequest {
            id: "call_1".into(),
            name: "wikipedia".into(),
            args: serde_json::json!({"title": "France"}),
        }]));
        conv.push(Message::ToolResult(ToolOutcome::ok("call_1", "wikipedia", "Paris ...")));
        conv.push(Message::AgentText("The capital is Paris.".into()));

        let t = conv.transcript();
        assert!(t.contains("User: find the capital"));
        assert!(t.contains("Assistant: [tool use]"));
        assert!(t.contains("Assistant: The capital is Paris."));
        // 工具结果不出现在转写中
        assert!(!t.contains("Paris ..."));
    }

    #[test]
    fn last_agent_text_skips_tool_requests() {
        let mut conv = Conversation::new();
        conv.push(Message::AgentText("draft".into()));
        conv.push(Message::AgentToolRequest(vec![]));
        assert_eq!(conv.last_agent_text(), Some("draft"));
        assert!(conv.last().unwrap().is_tool_request());
    }
}

//! 回合状态与评估结论
//!
//! TurnState 贯穿控制循环的全部节点，按会话 id 建立检查点；Verdict 为评估者的
//! 结构化裁决，恰好三个字段，其 JSON Schema（schemars 生成）会注入评估提示词。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::memory::{Conversation, Message};

/// 控制循环贯穿的回合状态
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnState {
    /// 会话历史（回合内只追加）
    pub conversation: Conversation,
    /// 本回合固定的成功标准（由调用方给出）
    pub success_criterion: String,
    /// 上一次评估被拒后留下的反馈；仅在拒绝后非空
    pub given_feedback: Option<String>,
    pub met_success_criteria: bool,
    pub required_user_input: bool,
    /// 本次 run 中评估者已裁决的次数（迭代上限用）
    pub evaluator_rounds: u32,
}

impl TurnState {
    pub fn new(success_criterion: impl Into<String>) -> Self {
        Self {
            conversation: Conversation::new(),
            success_criterion: success_criterion.into(),
            given_feedback: None,
            met_success_criteria: false,
            required_user_input: false,
            evaluator_rounds: 0,
        }
    }

    /// 以持久化历史为底，合并新的用户输入与成功标准。
    /// 每次任务提交都从这里开始：裁决标志与反馈全部重置。
    pub fn seed(conversation: Conversation, user_input: &str, success_criterion: &str) -> Self {
        let mut state = Self::new(success_criterion);
        state.conversation = conversation;
        state.conversation.push(Message::User(user_input.to_string()));
        state
    }
}

/// 评估者的结构化裁决：恰好三个字段，产出后不可变
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    /// Feedback on the assistant's performance
    pub feedback: String,
    /// Whether the success criteria has been met
    pub met_success_criteria: bool,
    /// True if more user input is required, clarification is needed, or the assistant is stuck
    pub required_user_input: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_resets_flags_and_appends_input() {
        let mut prior = Conversation::new();
        prior.push(Message::User("earlier task".into()));
        prior.push(Message::AgentText("earlier answer".into()));

        let state = TurnState::seed(prior, "new task", "the answer is complete");

        assert_eq!(state.conversation.len(), 3);
        assert!(matches!(
            state.conversation.last(),
            Some(Message::User(u)) if u == "new task"
        ));
        assert_eq!(state.success_criterion, "the answer is complete");
        assert!(state.given_feedback.is_none());
        assert!(!state.met_success_criteria);
        assert!(!state.required_user_input);
        assert_eq!(state.evaluator_rounds, 0);
    }

    #[test]
    fn turn_state_round_trips_through_serde() {
        let mut state = TurnState::new("criterion");
        state.conversation.push(Message::User("hello".into()));
        state.given_feedback = Some("missing citation".into());

        let json = serde_json::to_string(&state).unwrap();
        let back: TurnState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.success_criterion, "criterion");
        assert_eq!(back.given_feedback.as_deref(), Some("missing citation"));
        assert_eq!(back.conversation.len(), 1);
    }
}

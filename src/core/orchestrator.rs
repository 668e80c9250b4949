//! 控制循环：有向状态机
//!
//! Assistant -> (Tools -> Assistant)* -> Evaluator -> (Assistant | Terminal)。
//! 路由规则：助手最新消息含工具请求则去 Tools，否则去 Evaluator；Tools 执行后
//! 固定回 Assistant；评估后达标或需用户介入则终止，否则携带反馈回 Assistant。
//! 迭代上限为循环自身的安全网：超限时转为需要用户介入，而非无限循环。

use tokio_util::sync::CancellationToken;

use crate::agent::{AssistantNode, EvaluatorNode};
use crate::core::{AgentError, TurnState};
use crate::memory::Message;
use crate::tools::ToolDispatcher;

/// 状态机节点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Assistant,
    Tools,
    Evaluator,
    Terminal,
}

/// 控制循环编排器：独占回合状态的变更权
pub struct Orchestrator {
    assistant: AssistantNode,
    dispatcher: ToolDispatcher,
    evaluator: EvaluatorNode,
    max_evaluator_rounds: u32,
}

impl Orchestrator {
    pub fn new(
        assistant: AssistantNode,
        dispatcher: ToolDispatcher,
        evaluator: EvaluatorNode,
        max_evaluator_rounds: u32,
    ) -> Self {
        Self {
            assistant,
            dispatcher,
            evaluator,
            max_evaluator_rounds,
        }
    }

    /// Assistant 之后的路由：最新消息含工具请求则 Tools，否则 Evaluator
    pub fn route_after_assistant(state: &TurnState) -> LoopState {
        match state.conversation.last() {
            Some(msg) if msg.is_tool_request() => LoopState::Tools,
            _ => LoopState::Evaluator,
        }
    }

    /// Evaluator 之后的路由：达标或需用户介入则 Terminal，否则回 Assistant
    pub fn route_after_evaluator(state: &TurnState) -> LoopState {
        if state.met_success_criteria || state.required_user_input {
            LoopState::Terminal
        } else {
            LoopState::Assistant
        }
    }

    /// 驱动一次完整 run：从 Assistant 出发直至 Terminal，就地变更回合状态
    pub async fn run(
        &self,
        state: &mut TurnState,
        cancel_token: CancellationToken,
    ) -> Result<(), AgentError> {
        let mut node = LoopState::Assistant;
        let mut steps = 0u32;

        loop {
            if cancel_token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::debug!(?node, steps, "control loop step");
            steps += 1;

            match node {
                LoopState::Assistant => {
                    self.assistant.step(state).await?;
                    node = Self::route_after_assistant(state);
                }
                LoopState::Tools => {
                    self.dispatcher.step(state).await;
                    // 固定边：工具执行后必回 Assistant
                    node = LoopState::Assistant;
                }
                LoopState::Evaluator => {
                    self.evaluator.step(state).await?;

                    // 安全网：评估轮数超限时转为需要用户介入
                    if !state.met_success_criteria
                        && !state.required_user_input
                        && state.evaluator_rounds >= self.max_evaluator_rounds
                    {
                        tracing::warn!(
                            rounds = state.evaluator_rounds,
                            "evaluator round ceiling reached, requiring user input"
                        );
                        state.required_user_input = true;
                        state.conversation.push(Message::Evaluator(format!(
                            "Stopped after {} evaluation rounds without meeting the success \
                             criteria. Please give the assistant more guidance.",
                            state.evaluator_rounds
                        )));
                    }

                    node = Self::route_after_evaluator(state);
                }
                LoopState::Terminal => {
                    tracing::info!(
                        met = state.met_success_criteria,
                        needs_user_input = state.required_user_input,
                        rounds = state.evaluator_rounds,
                        "run terminated"
                    );
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolRequest;

    #[test]
    fn assistant_routes_tool_requests_to_tools() {
        let mut state = TurnState::new("criterion");
        state.conversation.push(Message::AgentToolRequest(vec![ToolRequest {
            id: "call_1".into(),
            name: "echo".into(),
            args: serde_json::json!({}),
        }]));
        assert_eq!(Orchestrator::route_after_assistant(&state), LoopState::Tools);
    }

    #[test]
    fn assistant_routes_text_to_evaluator() {
        let mut state = TurnState::new("criterion");
        state.conversation.push(Message::AgentText("done".into()));
        assert_eq!(
            Orchestrator::route_after_assistant(&state),
            LoopState::Evaluator
        );
    }

    #[test]
    fn evaluator_routing_honours_both_flags() {
        let mut state = TurnState::new("criterion");
        assert_eq!(
            Orchestrator::route_after_evaluator(&state),
            LoopState::Assistant
        );

        state.met_success_criteria = true;
        assert_eq!(
            Orchestrator::route_after_evaluator(&state),
            LoopState::Terminal
        );

        state.met_success_criteria = false;
        state.required_user_input = true;
        assert_eq!(
            Orchestrator::route_after_evaluator(&state),
            LoopState::Terminal
        );
    }
}

//! Assistant 节点
//!
//! 每步：以当前成功标准、日期时间与工具注意事项拼装治理指令（有拒绝反馈时追加
//! 整改指示），upsert 到指令槽，再将全量历史与工具声明交给模型，恰好追加一条消息。
//! 模型不可达或输出异常映射为 ReasoningFailure，不提交任何部分状态。

use std::sync::Arc;

use crate::core::{AgentError, TurnState};
use crate::llm::{AssistantReply, ChatModel, ToolSpec};
use crate::memory::Message;

/// Assistant 节点：持有模型与绑定的工具声明
pub struct AssistantNode {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolSpec>,
}

/// 拼装本轮治理指令
pub fn build_instructions(state: &TurnState) -> String {
    let now = chrono::Local::now().format("%d/%m/%Y, %H:%M:%S");
    let mut prompt = format!(
        "You are a capable assistant that uses tools to complete tasks effectively.\n\
         You keep working on the task until you either need a clarification from the user \
         or the success criteria is met.\n\
         Your tools let you search the web, fetch pages, look up encyclopedia entries, \
         manage files in your workspace, send notifications and run Python code. \
         Note: code output is only visible if you print() it.\n\
         The current date and time is: {}\n\n\
         This is the success criteria:\n{}\n\n\
         Reply either with a question for the user if you genuinely need more input — \
         state clearly what is needed, for example:\n\
         Question: Please confirm whether you want a short summary or a detailed breakdown.\n\
         Otherwise, once the task is done, reply with the final output and nothing else.",
        now, state.success_criterion
    );

    if let Some(feedback) = &state.given_feedback {
        prompt.push_str(&format!(
            "\n\nA previous attempt was judged not to meet the success criteria and was rejected.\n\
             Here is the feedback explaining the rejection:\n{}\n\n\
             With this feedback, revise your work and resubmit. Ask the user a question only \
             if it is genuinely required; otherwise make the changes needed to meet the \
             success criteria.",
            feedback
        ));
    }

    prompt
}

impl AssistantNode {
    pub fn new(model: Arc<dyn ChatModel>, tools: Vec<ToolSpec>) -> Self {
        Self { model, tools }
    }

    /// 执行一步：副作用为恰好一条追加的消息
    pub async fn step(&self, state: &mut TurnState) -> Result<(), AgentError> {
        let instructions = build_instructions(state);
        state.conversation.set_instructions(&instructions);

        let reply = self
            .model
            .complete(
                state.conversation.instructions(),
                state.conversation.entries(),
                &self.tools,
            )
            .await
            .map_err(AgentError::ReasoningFailure)?;

        match reply {
            AssistantReply::Text(text) => {
                state.conversation.push(Message::AgentText(text));
            }
            AssistantReply::ToolRequests(requests) => {
                tracing::debug!(count = requests.len(), "assistant requested tools");
                state.conversation.push(Message::AgentToolRequest(requests));
            }
        }
        Ok(())
    }
}

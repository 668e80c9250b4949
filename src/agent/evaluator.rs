//! Evaluator 节点
//!
//! 将整段会话渲染为线性转写，连同成功标准、最近一条助手回复与既往反馈交给评估
//! 模型，要求返回符合 Verdict JSON Schema 的结构化裁决（schemars 生成的 Schema
//! 注入提示词，降低格式错误）。解析失败在调用层重试，耗尽后报 EvaluationSchema，
//! 绝不折算为「未达标」。裁决字段整体覆盖回合状态，并以评估者角色追加反馈消息。

use std::sync::Arc;

use schemars::schema_for;

use crate::core::{AgentError, TurnState, Verdict};
use crate::llm::{AssistantReply, ChatModel};
use crate::memory::Message;

/// 结构化输出解析的调用层重试次数
const SCHEMA_RETRIES: usize = 2;

/// Evaluator 节点：持有评估模型（可与助手模型不同）
pub struct EvaluatorNode {
    model: Arc<dyn ChatModel>,
}

/// 从模型文本中提取并解析 Verdict JSON（容忍 ```json 围栏与前后缀散文）
pub fn parse_verdict(output: &str) -> Result<Verdict, String> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Err(format!("No JSON object in evaluator output: {}", trimmed)),
        }
    };

    serde_json::from_str(json_str).map_err(|e| format!("{}: {}", e, json_str))
}

fn judge_instructions() -> String {
    "You are an honest evaluator who judges whether the assistant completed the \
     assignment successfully. Respond with your feedback and your conclusion on whether \
     the success criteria has been met and whether more input is required from the user."
        .to_string()
}

fn judge_prompt(state: &TurnState) -> String {
    let latest = state
        .conversation
        .last_agent_text()
        .unwrap_or("[tool use]");

    let schema = schema_for!(Verdict);
    let schema_json =
        serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        "You are evaluating a conversation between a user and an assistant, deciding what \
         should happen next based on the assistant's latest response.\n\n\
         {}\n\
         The success criteria for this assignment is:\n{}\n\n\
         The latest response from the assistant that you are evaluating is:\n{}\n\n\
         Respond with honest feedback, whether the success criteria is met, and whether \
         more input from the user is required — either because the assistant has a \
         question, needs clarification, or seems stuck and unable to continue alone.\n",
        state.conversation.transcript(),
        state.success_criterion,
        latest
    );

    if let Some(feedback) = &state.given_feedback {
        prompt.push_str(&format!(
            "\nIn a prior iteration you gave this feedback: {}\n\
             If you notice the assistant repeating the same failure over and over, prefer \
             asking for more user input over endless retries.\n",
            feedback
        ));
    }

    prompt.push_str(&format!(
        "\nReply with a single JSON object matching this schema, and nothing else:\n{}\n",
        schema_json
    ));
    prompt
}

impl EvaluatorNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// 执行一步：产出裁决并折叠进回合状态
    pub async fn step(&self, state: &mut TurnState) -> Result<(), AgentError> {
        let instructions = judge_instructions();
        let prompt = judge_prompt(state);
        let request = vec![Message::User(prompt)];

        let mut last_err = String::new();
        for attempt in 0..=SCHEMA_RETRIES {
            let reply = self
                .model
                .complete(Some(&instructions), &request, &[])
                .await
                .map_err(AgentError::ReasoningFailure)?;

            let text = match reply {
                AssistantReply::Text(t) => t,
                AssistantReply::ToolRequests(_) => {
                    last_err = "evaluator replied with a tool call".to_string();
                    continue;
                }
            };

            match parse_verdict(&text) {
                Ok(verdict) => {
                    self.fold(state, verdict);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "evaluator output failed schema validation");
                    last_err = e;
                }
            }
        }
        Err(AgentError::EvaluationSchema(last_err))
    }

    /// 将裁决写入状态：反馈整体覆盖、标志置位、追加评估者消息
    fn fold(&self, state: &mut TurnState, mut verdict: Verdict) {
        // 卡死守卫：与上一次反馈逐字相同且两个标志皆未置位时，转为需要用户介入
        if !verdict.met_success_criteria
            && !verdict.required_user_input
            && state.given_feedback.as_deref() == Some(verdict.feedback.as_str())
        {
            tracing::warn!("evaluator feedback repeated verbatim, requiring user input");
            verdict.required_user_input = true;
        }

        state
            .conversation
            .push(Message::Evaluator(verdict.feedback.clone()));
        state.met_success_criteria = verdict.met_success_criteria;
        state.required_user_input = verdict.required_user_input;
        state.given_feedback = Some(verdict.feedback);
        state.evaluator_rounds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let v = parse_verdict(
            r#"{"feedback": "good", "met_success_criteria": true, "required_user_input": false}"#,
        )
        .unwrap();
        assert!(v.met_success_criteria);
        assert_eq!(v.feedback, "good");
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let v = parse_verdict(
            "Here is my verdict:\n```json\n{\"feedback\": \"missing source citation\", \
             \"met_success_criteria\": false, \"required_user_input\": false}\n```",
        )
        .unwrap();
        assert!(!v.met_success_criteria);
        assert_eq!(v.feedback, "missing source citation");
    }

    #[test]
    fn malformed_output_is_rejected() {
        assert!(parse_verdict("I think it went well").is_err());
        assert!(parse_verdict(r#"{"feedback": "only one field"}"#).is_err());
    }

    #[test]
    fn judge_prompt_embeds_schema_and_feedback() {
        let mut state = TurnState::new("criterion");
        state.conversation.push(Message::User("task".into()));
        state.conversation.push(Message::AgentText("answer".into()));
        state.given_feedback = Some("try again".into());

        let prompt = judge_prompt(&state);
        assert!(prompt.contains("met_success_criteria"));
        assert!(prompt.contains("try again"));
        assert!(prompt.contains("User: task"));
        assert!(prompt.contains("answer"));
    }
}

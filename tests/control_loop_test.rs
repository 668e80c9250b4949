//! 控制循环集成测试
//!
//! 用脚本化 Mock 模型驱动完整的 Assistant -> Tools -> Evaluator 循环。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use sidekick::agent::{SessionManager, SessionResource};
use sidekick::config::AppConfig;
use sidekick::core::AgentError;
use sidekick::llm::{AssistantReply, ChatModel, MockChatModel, ToolSpec};
use sidekick::memory::{Message, ToolRequest};
use sidekick::tools::{EchoTool, Tool};

fn verdict(feedback: &str, met: bool, needs_input: bool) -> AssistantReply {
    AssistantReply::Text(
        json!({
            "feedback": feedback,
            "met_success_criteria": met,
            "required_user_input": needs_input,
        })
        .to_string(),
    )
}

fn tool_request(id: &str, name: &str, args: serde_json::Value) -> AssistantReply {
    AssistantReply::ToolRequests(vec![ToolRequest {
        id: id.to_string(),
        name: name.to_string(),
        args,
    }])
}

fn manager_with(
    assistant: Arc<MockChatModel>,
    evaluator: Arc<MockChatModel>,
    max_rounds: u32,
) -> SessionManager {
    let mut cfg = AppConfig::default();
    cfg.run.max_evaluator_rounds = max_rounds;
    cfg.tools.tool_timeout_secs = 2;
    let shared: Vec<Arc<dyn Tool>> = vec![Arc::new(EchoTool)];
    SessionManager::new(assistant, evaluator, shared, cfg)
}

#[tokio::test]
async fn scenario_a_direct_answer_terminates_after_one_cycle() {
    let assistant = Arc::new(MockChatModel::scripted(vec![AssistantReply::Text(
        "The capital of France is Paris.".to_string(),
    )]));
    let evaluator = Arc::new(MockChatModel::scripted(vec![verdict(
        "Answer states the capital city.",
        true,
        false,
    )]));
    let manager = manager_with(assistant, evaluator, 10);
    let session = manager.create_session();

    let outcome = session
        .submit("Find the capital of France", "Answer states the capital city")
        .await
        .unwrap();

    assert!(outcome.met_success_criteria);
    assert!(!outcome.required_user_input);
    assert_eq!(outcome.assistant_reply, "The capital of France is Paris.");
    assert_eq!(outcome.evaluator_feedback, "Answer states the capital city.");

    let state = manager.checkpoints().get_or_create(session.id()).await;
    assert_eq!(state.evaluator_rounds, 1);
}

#[tokio::test]
async fn scenario_b_rejection_feedback_drives_revision() {
    let assistant = Arc::new(MockChatModel::scripted(vec![
        AssistantReply::Text("first attempt".to_string()),
        AssistantReply::Text("revised attempt with citation".to_string()),
    ]));
    let evaluator = Arc::new(MockChatModel::scripted(vec![
        verdict("missing source citation", false, false),
        verdict("looks complete now", true, false),
    ]));
    let manager = manager_with(Arc::clone(&assistant), evaluator, 10);
    let session = manager.create_session();

    let outcome = session
        .submit("Summarise the article", "Summary cites its source")
        .await
        .unwrap();

    assert!(outcome.met_success_criteria);
    assert_eq!(outcome.assistant_reply, "revised attempt with citation");

    // 第二次 Assistant 调用的指令必须携带拒绝反馈
    let instructions = assistant.instructions_seen();
    assert_eq!(instructions.len(), 2);
    assert!(!instructions[0].contains("missing source citation"));
    assert!(instructions[1].contains("missing source citation"));

    let state = manager.checkpoints().get_or_create(session.id()).await;
    assert_eq!(state.evaluator_rounds, 2);
    assert_eq!(state.given_feedback.as_deref(), Some("looks complete now"));
}

#[tokio::test]
async fn tool_roundtrip_correlates_request_and_result() {
    let assistant = Arc::new(MockChatModel::scripted(vec![
        tool_request("call_1", "echo", json!({"text": "ping"})),
        AssistantReply::Text("tool said ping".to_string()),
    ]));
    let evaluator = Arc::new(MockChatModel::scripted(vec![verdict("done", true, false)]));
    let manager = manager_with(assistant, evaluator, 10);
    let session = manager.create_session();

    let outcome = session.submit("ping the echo tool", "echo happened").await.unwrap();
    assert!(outcome.met_success_criteria);

    let state = manager.checkpoints().get_or_create(session.id()).await;
    let results: Vec<_> = state
        .conversation
        .entries()
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult(o) => Some(o),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].request_id, "call_1");
    assert_eq!(results[0].tool, "echo");
    assert_eq!(results[0].content, "ping");
    assert!(!results[0].is_error);
}

#[tokio::test]
async fn unknown_tool_recovers_and_returns_to_assistant() {
    let assistant = Arc::new(MockChatModel::scripted(vec![
        tool_request("call_1", "no_such_tool", json!({})),
        AssistantReply::Text("worked around the missing tool".to_string()),
    ]));
    let evaluator = Arc::new(MockChatModel::scripted(vec![verdict("fine", true, false)]));
    let manager = manager_with(assistant, evaluator, 10);
    let session = manager.create_session();

    let outcome = session.submit("do a thing", "thing is done").await.unwrap();
    assert!(outcome.met_success_criteria);

    let state = manager.checkpoints().get_or_create(session.id()).await;
    let error_result = state
        .conversation
        .entries()
        .iter()
        .find_map(|m| match m {
            Message::ToolResult(o) if o.is_error => Some(o),
            _ => None,
        })
        .expect("unknown tool must yield an error result");
    assert!(error_result.content.contains("Unknown tool"));
}

#[tokio::test]
async fn identical_feedback_twice_forces_user_input() {
    let assistant = Arc::new(MockChatModel::scripted(vec![
        AssistantReply::Text("attempt one".to_string()),
        AssistantReply::Text("attempt two".to_string()),
        AssistantReply::Text("attempt three".to_string()),
    ]));
    let evaluator = Arc::new(MockChatModel::scripted(vec![
        verdict("the answer is wrong", false, false),
        verdict("the answer is wrong", false, false),
    ]));
    let manager = manager_with(assistant, evaluator, 10);
    let session = manager.create_session();

    let outcome = session.submit("hard task", "impossible criterion").await.unwrap();

    // 第二次逐字相同的反馈触发守卫，循环在第三次尝试前终止
    assert!(outcome.required_user_input);
    assert!(!outcome.met_success_criteria);
    let state = manager.checkpoints().get_or_create(session.id()).await;
    assert_eq!(state.evaluator_rounds, 2);
}

#[tokio::test]
async fn evaluator_round_ceiling_forces_user_input() {
    let assistant = Arc::new(MockChatModel::scripted(vec![
        AssistantReply::Text("attempt one".to_string()),
        AssistantReply::Text("attempt two".to_string()),
        AssistantReply::Text("attempt three".to_string()),
    ]));
    // 反馈彼此不同，避开重复反馈守卫，验证轮数上限本身
    let evaluator = Arc::new(MockChatModel::scripted(vec![
        verdict("needs more detail", false, false),
        verdict("still needs more detail", false, false),
    ]));
    let manager = manager_with(assistant, evaluator, 2);
    let session = manager.create_session();

    let outcome = session.submit("hard task", "strict criterion").await.unwrap();

    assert!(outcome.required_user_input);
    assert!(outcome.evaluator_feedback.contains("Stopped after 2 evaluation rounds"));
}

#[tokio::test]
async fn resume_appends_to_persisted_history() {
    let assistant = Arc::new(MockChatModel::scripted(vec![
        AssistantReply::Text("first answer".to_string()),
        AssistantReply::Text("second answer".to_string()),
    ]));
    let evaluator = Arc::new(MockChatModel::scripted(vec![
        verdict("ok", true, false),
        verdict("ok again", true, false),
    ]));
    let manager = manager_with(assistant, evaluator, 10);
    let session = manager.create_session();

    session.submit("task one", "criterion one").await.unwrap();
    session.submit("task two", "criterion two").await.unwrap();

    let state = manager.checkpoints().get_or_create(session.id()).await;
    // 两次提交：2 条用户输入 + 2 条助手回复 + 2 条评估反馈
    assert_eq!(state.conversation.len(), 6);
    assert_eq!(state.success_criterion, "criterion two");
}

struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    async fn complete(
        &self,
        _instructions: Option<&str>,
        _history: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantReply, String> {
        Err("connection refused".to_string())
    }
}

#[tokio::test]
async fn unreachable_model_surfaces_reasoning_failure_without_checkpoint() {
    let manager = SessionManager::new(
        Arc::new(FailingModel),
        Arc::new(MockChatModel::echo()),
        vec![],
        AppConfig::default(),
    );
    let session = manager.create_session();

    let err = session.submit("task", "criterion").await.unwrap_err();
    assert!(matches!(err, AgentError::ReasoningFailure(_)));

    // 失败的 run 不提交部分状态
    assert!(!manager.checkpoints().contains(session.id()).await);
}

#[tokio::test]
async fn malformed_evaluator_output_exhausts_retries() {
    let assistant = Arc::new(MockChatModel::scripted(vec![AssistantReply::Text(
        "an answer".to_string(),
    )]));
    // 初次 + 两次重试全部非法
    let evaluator = Arc::new(MockChatModel::scripted(vec![
        AssistantReply::Text("I think it went well".to_string()),
        AssistantReply::Text("definitely good".to_string()),
        AssistantReply::Text("{\"feedback\": \"half a verdict\"}".to_string()),
    ]));
    let manager = manager_with(assistant, evaluator, 10);
    let session = manager.create_session();

    let err = session.submit("task", "criterion").await.unwrap_err();
    assert!(matches!(err, AgentError::EvaluationSchema(_)));
}

struct CountingResource {
    releases: AtomicUsize,
}

impl SessionResource for CountingResource {
    fn name(&self) -> &str {
        "counting"
    }
    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn teardown_is_idempotent_and_releases_once() {
    let manager = manager_with(
        Arc::new(MockChatModel::echo()),
        Arc::new(MockChatModel::echo()),
        10,
    );
    let session = manager.create_session();

    let resource = Arc::new(CountingResource {
        releases: AtomicUsize::new(0),
    });
    session.add_resource(Arc::clone(&resource) as Arc<dyn SessionResource>);

    session.teardown().await;
    session.teardown().await;
    assert_eq!(resource.releases.load(Ordering::SeqCst), 1);

    // 管理器级销毁重复调用也不报错
    manager.teardown_session(session.id()).await;
    manager.teardown_session(session.id()).await;
    assert_eq!(resource.releases.load(Ordering::SeqCst), 1);
}

//! 工具分发器
//!
//! 取最新助手消息中的全部工具请求并发执行（相互无顺序保证），每个请求恰好产出
//! 一条按 request_id 关联的 ToolResult；结果按请求顺序追加。单个工具失败、超时
//! 或名称未知都转为带错误文本的结果，不中断回合。每次调用输出 JSON 审计日志。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;

use crate::core::TurnState;
use crate::memory::{Message, ToolOutcome, ToolRequest};
use crate::tools::ToolRegistry;

/// 工具分发器：对每次调用施加超时，失败就地降级为错误结果
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 控制循环的 Tools 节点：读取最新消息中的请求，逐一追加结果。
    /// 固定边：执行后必定回到 Assistant，这里不产生路由分支。
    pub async fn step(&self, state: &mut TurnState) {
        let requests = match state.conversation.last() {
            Some(Message::AgentToolRequest(reqs)) => reqs.clone(),
            _ => return,
        };
        let outcomes = self.dispatch(&requests).await;
        for outcome in outcomes {
            state.conversation.push(Message::ToolResult(outcome));
        }
    }

    /// 并发执行一批请求；返回值按请求顺序排列
    pub async fn dispatch(&self, requests: &[ToolRequest]) -> Vec<ToolOutcome> {
        join_all(requests.iter().map(|r| self.dispatch_one(r))).await
    }

    async fn dispatch_one(&self, request: &ToolRequest) -> ToolOutcome {
        let start = Instant::now();

        let result = match self.registry.get(&request.name) {
            Some(tool) => match timeout(self.timeout, tool.execute(request.args.clone())).await {
                Ok(Ok(content)) => Ok(content),
                Ok(Err(e)) => Err((e, "error")),
                Err(_) => Err((
                    format!("Tool timed out after {}s", self.timeout.as_secs()),
                    "timeout",
                )),
            },
            None => Err((format!("Unknown tool: {}", request.name), "unknown_tool")),
        };

        let (ok, outcome_kind) = match &result {
            Ok(_) => (true, "ok"),
            Err((_, kind)) => (false, *kind),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "request_id": request.id,
            "ok": ok,
            "outcome": outcome_kind,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&request.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(content) => ToolOutcome::ok(&request.id, &request.name, content),
            Err((reason, _)) => ToolOutcome::error(&request.id, &request.name, reason),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

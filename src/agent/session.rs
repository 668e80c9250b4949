//! 会话与任务提交
//!
//! Session 按不透明 id 标识一次长期交互：持有该会话的工具注册表（共享能力实例
//! 注入 + 会话私有的浏览器）、检查点句柄与活动资源。submit 为一次任务提交：
//! 以持久化历史为底播种新的回合状态，驱动控制循环到 Terminal，写回检查点，
//! 提取助手最终回复与评估者反馈两条对用户可见的输出。
//!
//! teardown 释放会话资源且幂等；有异步上下文时走 spawn_blocking，否则（如进程
//! 退出时的 Drop）直接阻塞释放。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{AssistantNode, EvaluatorNode};
use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator, TurnState};
use crate::llm::{create_chat_model, ChatModel};
use crate::memory::CheckpointStore;
use crate::tools::{
    EchoTool, ListDirTool, NotifyTool, ReadFileTool, RunPythonTool, Tool, ToolDispatcher,
    ToolRegistry, WebSearchTool, WikipediaTool, WriteFileTool,
};

/// 会话级资源：teardown 时释放（浏览器等进程句柄）。release 必须幂等且可阻塞调用。
pub trait SessionResource: Send + Sync {
    fn name(&self) -> &str;
    fn release(&self);
}

/// 一次任务提交的两条对用户可见输出，附终态标志供调用方区分结局
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub assistant_reply: String,
    pub evaluator_feedback: String,
    pub met_success_criteria: bool,
    pub required_user_input: bool,
}

/// 会话：id、控制循环、检查点句柄、活动资源
pub struct Session {
    id: String,
    orchestrator: Orchestrator,
    checkpoints: Arc<CheckpointStore>,
    resources: Mutex<Vec<Arc<dyn SessionResource>>>,
    cancel: Mutex<CancellationToken>,
}

impl Session {
    fn new(id: String, orchestrator: Orchestrator, checkpoints: Arc<CheckpointStore>) -> Self {
        Self {
            id,
            orchestrator,
            checkpoints,
            resources: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_resource(&self, resource: Arc<dyn SessionResource>) {
        if let Ok(mut guard) = self.resources.lock() {
            guard.push(resource);
        }
    }

    /// 放弃当前 run（两次提交之间生效）
    pub fn cancel(&self) {
        if let Ok(guard) = self.cancel.lock() {
            guard.cancel();
        }
    }

    /// 一次任务提交：播种状态、驱动循环、写回检查点、提取输出。
    /// run 失败时不写回检查点（不提交部分状态）。
    pub async fn submit(
        &self,
        user_input: &str,
        success_criterion: &str,
    ) -> Result<TaskOutcome, AgentError> {
        let token = CancellationToken::new();
        if let Ok(mut guard) = self.cancel.lock() {
            *guard = token.clone();
        }

        let persisted = self.checkpoints.get_or_create(&self.id).await;
        let mut state = TurnState::seed(persisted.conversation, user_input, success_criterion);

        self.orchestrator.run(&mut state, token).await?;
        self.checkpoints.put(&self.id, state.clone()).await;

        Ok(TaskOutcome {
            assistant_reply: state
                .conversation
                .last_agent_text()
                .unwrap_or_default()
                .to_string(),
            evaluator_feedback: state
                .conversation
                .last_evaluator_feedback()
                .unwrap_or_default()
                .to_string(),
            met_success_criteria: state.met_success_criteria,
            required_user_input: state.required_user_input,
        })
    }

    fn drain_resources(&self) -> Vec<Arc<dyn SessionResource>> {
        self.resources
            .lock()
            .map(|mut guard| guard.drain(..).collect())
            .unwrap_or_default()
    }

    /// 释放会话资源；重复调用为 no-op
    pub async fn teardown(&self) {
        let drained = self.drain_resources();
        if drained.is_empty() {
            return;
        }
        let _ = tokio::task::spawn_blocking(move || {
            for resource in &drained {
                tracing::info!(resource = resource.name(), "releasing session resource");
                resource.release();
            }
        })
        .await;
    }

    /// 阻塞释放路径：无异步上下文时使用
    fn release_blocking(&self) {
        for resource in self.drain_resources() {
            tracing::info!(resource = resource.name(), "releasing session resource (blocking)");
            resource.release();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release_blocking();
    }
}

/// 会话管理器：进程级模型与共享工具实例，按需建会话
pub struct SessionManager {
    assistant_model: Arc<dyn ChatModel>,
    evaluator_model: Arc<dyn ChatModel>,
    shared_tools: Vec<Arc<dyn Tool>>,
    checkpoints: Arc<CheckpointStore>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    cfg: AppConfig,
}

impl SessionManager {
    pub fn new(
        assistant_model: Arc<dyn ChatModel>,
        evaluator_model: Arc<dyn ChatModel>,
        shared_tools: Vec<Arc<dyn Tool>>,
        cfg: AppConfig,
    ) -> Self {
        Self {
            assistant_model,
            evaluator_model,
            shared_tools,
            checkpoints: Arc::new(CheckpointStore::new()),
            sessions: Mutex::new(HashMap::new()),
            cfg,
        }
    }

    /// 从配置构建：选择模型后端、构造进程级共享工具
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let assistant_model = create_chat_model(cfg, &cfg.llm.model);
        let evaluator_model = create_chat_model(cfg, &cfg.llm.evaluator_model);
        let shared_tools = build_shared_tools(cfg)?;
        Ok(Self::new(
            assistant_model,
            evaluator_model,
            shared_tools,
            cfg.clone(),
        ))
    }

    pub fn checkpoints(&self) -> Arc<CheckpointStore> {
        Arc::clone(&self.checkpoints)
    }

    /// 新建会话：注入共享工具，按需挂接会话私有的浏览器
    pub fn create_session(&self) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();

        let mut registry = ToolRegistry::new();
        for tool in &self.shared_tools {
            registry.register_arc(Arc::clone(tool));
        }

        #[cfg(feature = "browser")]
        let browser_handle = {
            let handle = crate::tools::BrowserHandle::new();
            registry.register(crate::tools::BrowserTool::new(
                Arc::clone(&handle),
                self.cfg.tools.search.allowed_domains.clone(),
                self.cfg.tools.search.max_result_chars,
            ));
            handle
        };

        let specs = registry.specs();
        let dispatcher = ToolDispatcher::new(Arc::new(registry), self.cfg.tools.tool_timeout_secs);
        let assistant = AssistantNode::new(Arc::clone(&self.assistant_model), specs);
        let evaluator = EvaluatorNode::new(Arc::clone(&self.evaluator_model));
        let orchestrator = Orchestrator::new(
            assistant,
            dispatcher,
            evaluator,
            self.cfg.run.max_evaluator_rounds,
        );

        let session = Arc::new(Session::new(
            id.clone(),
            orchestrator,
            Arc::clone(&self.checkpoints),
        ));

        #[cfg(feature = "browser")]
        session.add_resource(browser_handle);

        if let Ok(mut guard) = self.sessions.lock() {
            guard.insert(id.clone(), Arc::clone(&session));
        }
        tracing::info!(session_id = %id, "session created");
        session
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|guard| guard.get(session_id).cloned())
    }

    /// 销毁会话：释放资源、移除检查点。未知 id 或重复销毁均为 no-op。
    pub async fn teardown_session(&self, session_id: &str) {
        let session = self
            .sessions
            .lock()
            .ok()
            .and_then(|mut guard| guard.remove(session_id));
        if let Some(session) = session {
            session.teardown().await;
        }
        self.checkpoints.remove(session_id).await;
        tracing::info!(session_id = %session_id, "session torn down");
    }
}

/// 构造进程级共享工具实例（每进程一次，注入各会话注册表）
pub fn build_shared_tools(cfg: &AppConfig) -> Result<Vec<Arc<dyn Tool>>, AgentError> {
    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("workspace"));
    std::fs::create_dir_all(&workspace)
        .map_err(|e| AgentError::ConfigError(format!("workspace {}: {}", workspace.display(), e)))?;

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ReadFileTool::new(&workspace)),
        Arc::new(WriteFileTool::new(&workspace)),
        Arc::new(ListDirTool::new(&workspace)),
        Arc::new(WebSearchTool::new(
            cfg.tools.search.allowed_domains.clone(),
            cfg.tools.search.search_endpoint.clone(),
            cfg.tools.search.timeout_secs,
            cfg.tools.search.max_result_chars,
        )),
        Arc::new(WikipediaTool::new(
            cfg.tools.search.timeout_secs,
            cfg.tools.search.max_result_chars,
        )),
        Arc::new(RunPythonTool::new(&workspace, cfg.tools.code.timeout_secs)),
        Arc::new(NotifyTool::new(
            cfg.tools.notify.endpoint.clone(),
            cfg.tools.tool_timeout_secs,
        )),
        Arc::new(EchoTool),
    ];
    Ok(tools)
}

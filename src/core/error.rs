//! 错误类型
//!
//! ReasoningFailure / EvaluationSchema 对当前步骤是致命的，向调用方上抛；
//! ToolExecutionFailed / ToolTimeout / UnknownTool 由分发器就地转为带错误文本的
//! 工具结果，不会中断回合。

use thiserror::Error;

/// 运行过程中可能出现的错误（推理、评估、工具、配置、路径逃逸等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 底层推理能力不可达或返回无法解析的输出
    #[error("Reasoning failure: {0}")]
    ReasoningFailure(String),

    /// 评估者输出未通过结构化校验（重试耗尽后才会出现，绝不折算为「未达标」）
    #[error("Evaluator output failed schema validation: {0}")]
    EvaluationSchema(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// 调用方在步骤之间放弃了本次任务提交
    #[error("Cancelled by caller")]
    Cancelled,
}

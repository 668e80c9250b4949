//! Sidekick - 受监督的助手/评估者智能体运行时
//!
//! 模块划分：
//! - **agent**: Assistant 节点、Evaluator 节点、会话与任务提交
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、回合状态、控制循环状态机
//! - **llm**: 聊天模型抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话历史与按会话 id 的检查点存储
//! - **observability**: tracing 初始化
//! - **tools**: 工具箱（文件、搜索、百科、代码执行、通知、浏览器）与分发器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

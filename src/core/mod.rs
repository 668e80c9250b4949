//! 核心层：错误分类、回合状态、控制循环

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{LoopState, Orchestrator};
pub use state::{TurnState, Verdict};

//! 检查点存储：按会话 id 的回合状态
//!
//! 进程内键值存储。恢复是显式操作：get_or_create 返回已有状态或全新状态，
//! put 写回；同一会话的后续调用得以续接而非重来。

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::core::TurnState;

/// 进程内检查点存储（key = 会话 id）
#[derive(Default)]
pub struct CheckpointStore {
    inner: RwLock<HashMap<String, TurnState>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回该会话已持久化的状态；没有则返回空白状态
    pub async fn get_or_create(&self, session_id: &str) -> TurnState {
        let guard = self.inner.read().await;
        guard
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| TurnState::new(String::new()))
    }

    pub async fn put(&self, session_id: &str, state: TurnState) {
        let mut guard = self.inner.write().await;
        guard.insert(session_id.to_string(), state);
    }

    /// 会话销毁时移除检查点；不存在时为 no-op
    pub async fn remove(&self, session_id: &str) {
        let mut guard = self.inner.write().await;
        guard.remove(session_id);
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.read().await.contains_key(session_id)
    }
}

//! 内存会话存储

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{NewSession, Session, SessionStatus, SessionStore};
use crate::core::{Clock, StoreError, SystemClock};

/// 内存会话存储：进程退出即丢失，主要用于测试
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// 模拟报告写入方在带外记录报告路径
    pub async fn record_artifact(&self, id: &str, path: impl Into<String>) -> bool {
        match self.sessions.write().await.get_mut(id) {
            Some(session) => {
                session.artifact_path = Some(path.into());
                true
            }
            None => false,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, new: NewSession) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&new.id) {
            return Err(StoreError::Duplicate(new.id));
        }
        let session = Session {
            id: new.id.clone(),
            request_id: new.request_id,
            external_handle: new.external_handle,
            status: SessionStatus::Processing,
            title: new.title,
            artifact_path: None,
            notify_target: new.notify_target,
            created_at: self.clock.now(),
            completed_at: None,
        };
        sessions.insert(new.id, session.clone());
        Ok(session)
    }

    async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
        artifact_path: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(false);
        };
        if session.status.is_terminal() {
            return Ok(false);
        }
        session.status = status;
        if status == SessionStatus::Completed {
            if let Some(path) = artifact_path {
                session.artifact_path = Some(path.to_string());
            }
        }
        if status.is_terminal() {
            session.completed_at = Some(self.clock.now());
        }
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut all: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn get_by_external_handle(&self, handle: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.external_handle == handle)
            .cloned())
    }
}

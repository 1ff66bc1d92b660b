//! 编排器门面：入口路由与关闭钩子只依赖这里的 start / active_count / drain_all

use std::sync::Arc;

use crate::agent::StatusProbe;
use crate::core::{Clock, OrchestratorError};
use crate::notify::{NotificationDispatcher, NotifyTarget};
use crate::store::SessionStore;

use super::{PollRegistry, PollSettings};

/// 编排器
#[derive(Clone)]
pub struct Orchestrator {
    registry: PollRegistry,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        probe: Arc<dyn StatusProbe>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        Self {
            registry: PollRegistry::new(store, probe, dispatcher, clock, settings),
        }
    }

    /// 开始跟踪一个已入库的会话。重复调用是无害的空操作。
    pub async fn start(
        &self,
        session_id: &str,
        external_handle: &str,
        notify_target: Option<NotifyTarget>,
    ) -> Result<(), OrchestratorError> {
        if session_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput("session id is empty".to_string()));
        }
        if external_handle.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "external handle is empty".to_string(),
            ));
        }
        self.registry
            .start(session_id, external_handle, notify_target)
            .await;
        Ok(())
    }

    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }

    /// 终止所有在途轮询并写 failed；返回后不会再有定时任务触发
    pub async fn drain_all(&self) -> usize {
        self.registry.drain_all().await
    }
}

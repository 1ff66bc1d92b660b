//! Mock Agent 与脚本化探针（用于测试，无需真实 OpenCode）

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AgentService, ProbeStatus, SessionActivity, StatusMap, StatusProbe};
use crate::core::AgentServiceError;

/// 内存中的 Agent：状态表可手动设置，各操作可切换为失败
#[derive(Debug, Default)]
pub struct MockAgentService {
    activities: Mutex<StatusMap>,
    prompts: Mutex<Vec<(String, String)>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
    fail_submit: AtomicBool,
    fail_status: AtomicBool,
    unhealthy: AtomicBool,
}

impl MockAgentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_activity(&self, handle: &str, activity: SessionActivity) {
        self.activities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.to_string(), activity);
    }

    /// 模拟 Agent 不再跟踪该会话
    pub fn forget(&self, handle: &str) {
        self.activities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(handle);
    }

    pub fn set_create_failing(&self, failing: bool) {
        self.fail_create.store(failing, Ordering::SeqCst);
    }

    pub fn set_submit_failing(&self, failing: bool) {
        self.fail_submit.store(failing, Ordering::SeqCst);
    }

    pub fn set_status_failing(&self, failing: bool) {
        self.fail_status.store(failing, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// 已提交的 (handle, 指令)
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AgentService for MockAgentService {
    async fn health(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }

    async fn create_unit(&self, _title: &str) -> Result<String, AgentServiceError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AgentServiceError::Status(503));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = format!("ses_mock_{}", n);
        self.set_activity(&handle, SessionActivity::Busy);
        Ok(handle)
    }

    async fn submit_instructions(&self, handle: &str, text: &str) -> bool {
        if self.fail_submit.load(Ordering::SeqCst) {
            return false;
        }
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((handle.to_string(), text.to_string()));
        true
    }

    async fn query_status(&self) -> Result<StatusMap, AgentServiceError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(AgentServiceError::Malformed("mock status failure".to_string()));
        }
        Ok(self.activities.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// 脚本化探针：每个 handle 按序返回预设结果，用完后返回 fallback
#[derive(Debug)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<ProbeStatus>>>,
    fallback: ProbeStatus,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProbe {
    pub fn new(fallback: ProbeStatus) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, handle: &str, sequence: impl IntoIterator<Item = ProbeStatus>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.to_string(), sequence.into_iter().collect());
        self
    }

    /// 该 handle 被探测的次数
    pub fn calls(&self, handle: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(handle)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn probe(&self, external_handle: &str) -> ProbeStatus {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(external_handle.to_string())
            .or_default() += 1;
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(external_handle)
            .and_then(|q| q.pop_front())
            .unwrap_or(self.fallback)
    }
}

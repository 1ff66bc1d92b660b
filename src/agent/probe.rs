//! 状态探针：把 Agent 的状态查询折叠为 idle / busy / unknown 三值

use std::sync::Arc;

use async_trait::async_trait;

use super::{AgentService, SessionActivity};

/// 探测结果。Unknown 表示"本次无法判断，稍后再试"，既不算完成也不算忙。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Idle,
    Busy,
    Unknown,
}

/// 探针接口（轮询注册表依赖此 trait，测试中注入脚本化实现）
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, external_handle: &str) -> ProbeStatus;
}

/// 基于 AgentService 的探针
pub struct AgentStatusProbe {
    agent: Arc<dyn AgentService>,
}

impl AgentStatusProbe {
    pub fn new(agent: Arc<dyn AgentService>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl StatusProbe for AgentStatusProbe {
    async fn probe(&self, external_handle: &str) -> ProbeStatus {
        match self.agent.query_status().await {
            // 状态表里没有该 handle：Agent 不再跟踪它，按已完成处理
            Ok(map) => match map.get(external_handle) {
                Some(SessionActivity::Busy) => ProbeStatus::Busy,
                Some(SessionActivity::Idle) | None => ProbeStatus::Idle,
            },
            Err(e) => {
                tracing::debug!("Status query failed for {}: {}", external_handle, e);
                ProbeStatus::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockAgentService;

    #[tokio::test]
    async fn test_probe_maps_agent_status() {
        let agent = Arc::new(MockAgentService::new());
        agent.set_activity("h_busy", SessionActivity::Busy);
        agent.set_activity("h_idle", SessionActivity::Idle);
        let probe = AgentStatusProbe::new(agent.clone());

        assert_eq!(probe.probe("h_busy").await, ProbeStatus::Busy);
        assert_eq!(probe.probe("h_idle").await, ProbeStatus::Idle);
        assert_eq!(probe.probe("h_absent").await, ProbeStatus::Idle);
    }

    #[tokio::test]
    async fn test_probe_transport_failure_is_unknown() {
        let agent = Arc::new(MockAgentService::new());
        agent.set_activity("h1", SessionActivity::Busy);
        agent.set_status_failing(true);
        let probe = AgentStatusProbe::new(agent.clone());
        assert_eq!(probe.probe("h1").await, ProbeStatus::Unknown);

        agent.set_status_failing(false);
        assert_eq!(probe.probe("h1").await, ProbeStatus::Busy);
    }
}

//! Agent 服务抽象（OpenCode）
//!
//! 编排器只需要三个操作：创建会话、提交指令、查询忙闲状态；health 用于健康检查。
//! 实现：OpencodeClient（HTTP）、MockAgentService（测试）。

pub mod mock;
mod opencode;
mod probe;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::AgentServiceError;

pub use mock::{MockAgentService, ScriptedProbe};
pub use opencode::OpencodeClient;
pub use probe::{AgentStatusProbe, ProbeStatus, StatusProbe};

/// Agent 报告的单个会话活动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionActivity {
    Idle,
    Busy,
}

/// 状态查询结果：handle -> 活动状态。
/// 不在表中的 handle 视为已结束（Agent 不再跟踪已完成的会话）。
pub type StatusMap = HashMap<String, SessionActivity>;

/// Agent 服务接口
#[async_trait]
pub trait AgentService: Send + Sync {
    /// 服务是否在线
    async fn health(&self) -> bool;

    /// 创建一个工作单元，返回 Agent 侧 handle
    async fn create_unit(&self, title: &str) -> Result<String, AgentServiceError>;

    /// 异步提交指令；返回是否被接受
    async fn submit_instructions(&self, handle: &str, text: &str) -> bool;

    /// 查询所有会话的忙闲状态
    async fn query_status(&self) -> Result<StatusMap, AgentServiceError>;
}

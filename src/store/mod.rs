//! 会话存储抽象层
//!
//! 研究会话按 id 持久化；编排器只使用窄接口：插入、更新状态、按 id 读取、按时间列出。
//! 提供内存（测试 / 无数据库运行）与 SQLite 两种实现。

mod memory;
mod sqlite;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::StoreError;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

/// 会话状态：processing 起步，completed / failed 为终态，不可再变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 历史库 status 列的默认值；读取时识别，本服务从不写入
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Corrupt(format!("unknown status '{}'", other))),
        }
    }
}

/// 持久化的研究会话（JSON 字段名与前端 / Telegram Bot 保持一致）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub request_id: String,
    /// OpenCode 侧的会话 id
    #[serde(rename = "opencodeSessionId")]
    pub external_handle: String,
    pub status: SessionStatus,
    pub title: String,
    /// 报告路径，仅在 completed 时可能存在
    #[serde(rename = "reportPath", skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    /// Telegram chat id
    #[serde(rename = "telegramChatId", skip_serializing_if = "Option::is_none")]
    pub notify_target: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// 插入参数：状态固定为 processing，时间由存储的时钟填充
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub request_id: String,
    pub external_handle: String,
    pub title: String,
    pub notify_target: Option<i64>,
}

impl NewSession {
    /// HTTP 入口创建的会话：request_id 与 id 相同
    pub fn new(id: impl Into<String>, external_handle: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            request_id: id.clone(),
            id,
            external_handle: external_handle.into(),
            title: title.into(),
            notify_target: None,
        }
    }

    pub fn with_notify_target(mut self, target: Option<i64>) -> Self {
        self.notify_target = target;
        self
    }
}

/// 会话存储接口
///
/// 多个轮询任务会并发调用；实现自行串行化写入。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 插入新会话（状态 processing）
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError>;

    /// 写入终态；已处于终态或不存在时返回 Ok(false)。
    /// artifact_path 为 None 时保留已有值，且只在 completed 时写入。
    async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
        artifact_path: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// 按 id 读取
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// 按创建时间倒序列出
    async fn list(&self, limit: usize) -> Result<Vec<Session>, StoreError>;

    /// 按 OpenCode 会话 id 读取
    async fn get_by_external_handle(&self, handle: &str) -> Result<Option<Session>, StoreError>;

    /// 关闭底层连接；之后的调用返回 StoreError::Closed
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_and_terminal() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Processing,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());
        assert!("done".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_session_json_field_names() {
        let session = Session {
            id: "r1".into(),
            request_id: "r1".into(),
            external_handle: "ses_1".into(),
            status: SessionStatus::Processing,
            title: "Build & Learn: example.com".into(),
            artifact_path: None,
            notify_target: Some(42),
            created_at: Utc::now(),
            completed_at: None,
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["opencodeSessionId"], "ses_1");
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["status"], "processing");
        assert_eq!(value["telegramChatId"], 42);
        assert!(value.get("reportPath").is_none());
        assert!(value.get("completedAt").is_none());
    }
}

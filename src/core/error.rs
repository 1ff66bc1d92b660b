//! 错误类型
//!
//! 编排器只在输入非法时向调用方返回错误；存储、Agent 服务、请求入口各自有独立的错误枚举。

use thiserror::Error;

/// 编排器入口错误：仅在输入非法时出现（注册表不会被触碰）
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// 会话存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session already exists: {0}")]
    Duplicate(String),

    #[error("Corrupt session row: {0}")]
    Corrupt(String),

    /// 关闭后仍有调用（关闭顺序错误）
    #[error("Store is closed")]
    Closed,
}

/// Agent 服务（OpenCode）调用错误
#[derive(Error, Debug)]
pub enum AgentServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// 研究请求校验错误（对应 HTTP 400）
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Missing required fields: type, source")]
    MissingFields,

    #[error("Unsupported request type: {0}")]
    UnsupportedType(String),

    #[error("Unsupported request source: {0}")]
    UnsupportedSource(String),

    #[error("URL is required for type \"url\"")]
    MissingUrl,

    #[error("Text or URLs required for type \"x_post\"")]
    MissingContent,
}

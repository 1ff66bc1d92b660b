//! Build & Learn - 研究任务中继
//!
//! 接收研究请求，派发给 OpenCode Agent，轮询直到会话空闲或超时，
//! 把结果写入会话存储并通过 Telegram 通知发起人。
//!
//! 模块划分：
//! - **agent**: Agent 服务抽象（OpenCode HTTP 客户端 / Mock）与状态探针
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、时钟、优雅关闭
//! - **intake**: 请求校验、会话标题与研究 Prompt 生成
//! - **notify**: 通知通道（Telegram / 录制用 Mock）与消息分发
//! - **observability**: tracing 日志初始化
//! - **poller**: 轮询注册表与编排器门面
//! - **server**: axum HTTP 路由
//! - **store**: 会话记录存储（SQLite / 内存）

pub mod agent;
pub mod config;
pub mod core;
pub mod intake;
pub mod notify;
pub mod observability;
pub mod poller;
pub mod server;
pub mod store;

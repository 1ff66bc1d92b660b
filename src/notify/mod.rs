//! 通知分发
//!
//! 研究完成 / 失败时向发起方（Telegram chat）推送一条消息。
//! 投递是尽力而为：通道错误只记录日志并返回 false，从不阻塞或回滚状态迁移。

pub mod mock;
mod telegram;

use std::sync::Arc;

use async_trait::async_trait;

pub use mock::RecordingChannel;
pub use telegram::TelegramChannel;

/// 通知目标地址（Telegram chat id）
pub type NotifyTarget = i64;

/// 消息格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Markdown,
    Html,
}

impl MessageFormat {
    /// Telegram parse_mode 取值
    pub fn parse_mode(&self) -> &'static str {
        match self {
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
        }
    }
}

/// 外部消息通道
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, target: NotifyTarget, text: &str, format: MessageFormat) -> anyhow::Result<()>;
}

/// 完成消息；报告路径缺省时省略该行
pub fn success_message(title: &str, artifact_path: Option<&str>) -> String {
    match artifact_path {
        Some(path) => format!(
            "✅ *Research Complete!*\n\n📋 *{}*\n\n📄 Report: `{}`",
            title, path
        ),
        None => format!("✅ *Research Complete!*\n\n📋 *{}*", title),
    }
}

/// 失败消息；原因缺省时省略该行
pub fn failure_message(title: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("❌ *Research Failed*\n\n📋 *{}*\n\nError: {}", title, reason),
        None => format!("❌ *Research Failed*\n\n📋 *{}*", title),
    }
}

/// 通知分发器：未配置通道时所有投递直接返回 false
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    channel: Option<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channel: Option<Arc<dyn NotificationChannel>>) -> Self {
        Self { channel }
    }

    pub fn disabled() -> Self {
        Self { channel: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    pub async fn deliver_success(
        &self,
        target: NotifyTarget,
        title: &str,
        artifact_path: Option<&str>,
    ) -> bool {
        self.deliver(target, &success_message(title, artifact_path)).await
    }

    pub async fn deliver_failure(
        &self,
        target: NotifyTarget,
        title: &str,
        reason: Option<&str>,
    ) -> bool {
        self.deliver(target, &failure_message(title, reason)).await
    }

    async fn deliver(&self, target: NotifyTarget, text: &str) -> bool {
        let Some(channel) = &self.channel else {
            tracing::warn!("Notification channel not configured, skipping notification to {}", target);
            return false;
        };
        match channel.send(target, text, MessageFormat::Markdown).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to deliver notification to {}: {:#}", target, e);
                false
            }
        }
    }
}

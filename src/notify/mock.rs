//! 记录型通知通道（用于测试）

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{MessageFormat, NotificationChannel, NotifyTarget};

/// 一条已投递的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: NotifyTarget,
    pub text: String,
    pub format: MessageFormat,
}

/// 记录所有投递；可切换为失败模式（失败的投递只计入 attempts）
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentMessage>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, target: NotifyTarget, text: &str, format: MessageFormat) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("recording channel set to fail");
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                target,
                text: text.to_string(),
                format,
            });
        Ok(())
    }
}

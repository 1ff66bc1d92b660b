//! 轮询注册表：在途研究会话的唯一状态机
//!
//! 每个条目拥有两个定时任务：周期探测（interval）与截止（deadline），共享同一个 CancellationToken。
//! "认领"条目 = 在锁内从表中移除并取消令牌；完成、超时、关闭三条路径谁先认领谁生效，
//! 后来者找不到条目即什么都不做，因此每个会话的终态只写一次。
//!
//! 锁只在读写条目表时持有，探测、存储写入与通知都在锁外进行。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::agent::{ProbeStatus, StatusProbe};
use crate::config::PollerSection;
use crate::core::Clock;
use crate::notify::{NotificationDispatcher, NotifyTarget};
use crate::store::{SessionStatus, SessionStore};

/// 超时失败时通知里的原因
pub const TIMEOUT_REASON: &str = "timed out";

/// 轮询参数：探测间隔与最长存活时间（从 start 起算）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_duration: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&PollerSection> for PollSettings {
    fn from(section: &PollerSection) -> Self {
        Self {
            interval: Duration::from_secs(section.interval_secs.max(1)),
            max_duration: Duration::from_secs(section.max_duration_secs.max(1)),
        }
    }
}

/// 条目拥有的两个定时任务
struct PollTimers {
    cancel: CancellationToken,
    probe: JoinHandle<()>,
    deadline: JoinHandle<()>,
}

impl PollTimers {
    fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 等待两个任务退出（仅在认领者不是它们自己时调用）
    async fn join(self) {
        let _ = self.probe.await;
        let _ = self.deadline.await;
    }
}

/// 在途轮询条目
struct PollEntry {
    external_handle: String,
    notify_target: Option<NotifyTarget>,
    started_at: DateTime<Utc>,
    timers: PollTimers,
}

struct Inner {
    entries: Mutex<HashMap<String, PollEntry>>,
    store: Arc<dyn SessionStore>,
    probe: Arc<dyn StatusProbe>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    settings: PollSettings,
}

/// 轮询注册表
#[derive(Clone)]
pub struct PollRegistry {
    inner: Arc<Inner>,
}

impl PollRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        probe: Arc<dyn StatusProbe>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                store,
                probe,
                dispatcher,
                clock,
                settings,
            }),
        }
    }

    /// 开始轮询；该会话已在轮询时只记警告并返回 false
    pub async fn start(
        &self,
        session_id: &str,
        external_handle: &str,
        notify_target: Option<NotifyTarget>,
    ) -> bool {
        let mut entries = self.inner.entries.lock().await;
        if entries.contains_key(session_id) {
            tracing::warn!("Poll already active for request {}", session_id);
            return false;
        }

        let settings = self.inner.settings;
        let cancel = CancellationToken::new();
        let deadline_at = Instant::now() + settings.max_duration;

        let probe = tokio::spawn(Arc::clone(&self.inner).run_probe_loop(
            session_id.to_string(),
            external_handle.to_string(),
            cancel.clone(),
        ));
        let deadline = tokio::spawn(Arc::clone(&self.inner).run_deadline(
            session_id.to_string(),
            deadline_at,
            cancel.clone(),
        ));

        entries.insert(
            session_id.to_string(),
            PollEntry {
                external_handle: external_handle.to_string(),
                notify_target,
                started_at: self.inner.clock.now(),
                timers: PollTimers {
                    cancel,
                    probe,
                    deadline,
                },
            },
        );

        tracing::info!(
            "Started polling for session {} (request {}, every {:?}, deadline {:?})",
            external_handle,
            session_id,
            settings.interval,
            settings.max_duration
        );
        true
    }

    /// 在途条目数
    pub async fn active_count(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.inner.entries.lock().await.contains_key(session_id)
    }

    /// 关闭时调用：认领全部条目，等待其定时任务退出，然后逐个写 failed。
    /// 返回被终止的会话数。
    pub async fn drain_all(&self) -> usize {
        let drained: Vec<(String, PollEntry)> = {
            let mut entries = self.inner.entries.lock().await;
            let drained: Vec<_> = entries.drain().collect();
            for (_, entry) in &drained {
                entry.timers.cancel();
            }
            drained
        };

        if drained.is_empty() {
            return 0;
        }
        tracing::info!("Stopping {} active polls", drained.len());

        let count = drained.len();
        join_all(drained.into_iter().map(|(session_id, entry)| {
            let inner = Arc::clone(&self.inner);
            async move {
                entry.timers.join().await;
                inner.mark_failed(&session_id, "stopped").await;
            }
        }))
        .await;
        count
    }
}

impl Inner {
    /// 认领条目：移除并取消其定时任务。已被他人认领时返回 None。
    async fn claim(&self, session_id: &str) -> Option<PollEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(session_id)?;
        entry.timers.cancel();
        Some(entry)
    }

    async fn run_probe_loop(
        self: Arc<Self>,
        session_id: String,
        external_handle: String,
        cancel: CancellationToken,
    ) {
        let interval = self.settings.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                _ = cancel.cancelled() => return,
                status = self.probe.probe(&external_handle) => status,
            };

            match status {
                ProbeStatus::Idle => {
                    self.complete(&session_id).await;
                    return;
                }
                ProbeStatus::Busy => {
                    tracing::debug!("Session {} still busy", external_handle);
                }
                ProbeStatus::Unknown => {
                    tracing::warn!(
                        "Unknown status for session {}, continuing to poll",
                        external_handle
                    );
                }
            }
        }
    }

    async fn run_deadline(self: Arc<Self>, session_id: String, deadline_at: Instant, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep_until(deadline_at) => {
                self.expire(&session_id).await;
            }
        }
    }

    /// 探测到 idle：写 completed，并通知（带带外记录的报告路径）
    async fn complete(&self, session_id: &str) {
        let Some(entry) = self.claim(session_id).await else {
            return;
        };

        let session = match self.store.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::error!(
                    "Session {} not found in database, poll registry and store have diverged",
                    session_id
                );
                return;
            }
            Err(e) => {
                tracing::error!("Failed to load session {}: {}", session_id, e);
                return;
            }
        };

        match self
            .store
            .update_status(session_id, SessionStatus::Completed, None)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Session {} already terminal, skipping completion", session_id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to mark session {} completed: {}", session_id, e);
                return;
            }
        }

        let elapsed = self.clock.now() - entry.started_at;
        tracing::info!(
            "Research {} completed after {}s",
            session_id,
            elapsed.num_seconds()
        );

        if let Some(target) = entry.notify_target {
            self.dispatcher
                .deliver_success(target, &session.title, session.artifact_path.as_deref())
                .await;
        }
    }

    /// 截止时间到：写 failed，并通知超时
    async fn expire(&self, session_id: &str) {
        let Some(entry) = self.claim(session_id).await else {
            return;
        };
        tracing::warn!(
            "Poll timeout for request {} (session {})",
            session_id,
            entry.external_handle
        );

        if !self.mark_failed(session_id, TIMEOUT_REASON).await {
            return;
        }

        let Some(target) = entry.notify_target else {
            return;
        };
        match self.store.get(session_id).await {
            Ok(Some(session)) => {
                self.dispatcher
                    .deliver_failure(target, &session.title, Some(TIMEOUT_REASON))
                    .await;
            }
            Ok(None) => {
                tracing::error!(
                    "Session {} vanished after timeout, skipping notification",
                    session_id
                );
            }
            Err(e) => {
                tracing::error!("Failed to load session {} for notification: {}", session_id, e);
            }
        }
    }

    /// 写 failed；返回是否真正发生了迁移
    async fn mark_failed(&self, session_id: &str, reason: &str) -> bool {
        match self
            .store
            .update_status(session_id, SessionStatus::Failed, None)
            .await
        {
            Ok(true) => {
                tracing::info!("Research {} failed ({})", session_id, reason);
                true
            }
            Ok(false) => {
                tracing::warn!(
                    "Session {} missing or already terminal, not marked failed",
                    session_id
                );
                false
            }
            Err(e) => {
                tracing::error!("Failed to mark session {} failed: {}", session_id, e);
                false
            }
        }
    }
}

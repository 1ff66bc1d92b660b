//! 优雅关闭处理
//!
//! 提供统一的关闭信号监听和清理逻辑，确保：
//! - HTTP 服务停止接收新请求
//! - 在途轮询全部终止并写 failed，之后不再有定时任务触发
//! - 会话存储在轮询清空之后才关闭

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::poller::Orchestrator;
use crate::store::SessionStore;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    /// 关闭信号 token
    shutdown_token: CancellationToken,
    /// 关闭原因广播
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM 信号
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 获取关闭 token（axum graceful shutdown 等待它）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭
    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    /// 订阅关闭原因；须在触发前订阅
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 单个清理任务的超时时间
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// 关闭协调器：按注册顺序执行清理任务，单个任务失败或超时不影响后续任务
#[derive(Default)]
pub struct ShutdownCoordinator {
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 服务的标准清理顺序：先清空轮询（会写 failed），再关闭存储
    pub fn for_service(orchestrator: Orchestrator, store: Arc<dyn SessionStore>) -> Self {
        let mut coordinator = Self::new();
        coordinator.register(PollDrainCleanup::new(orchestrator));
        coordinator.register(StoreCleanup::new(store));
        coordinator
    }

    /// 注册清理任务（按注册顺序执行）
    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    /// 执行所有清理任务
    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(CLEANUP_TIMEOUT, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Cleanup task '{}' completed successfully", name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Cleanup task '{}' failed: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Cleanup task '{}' timed out after {}s",
                        name,
                        CLEANUP_TIMEOUT.as_secs()
                    );
                }
            }
        }

        tracing::info!("All cleanup tasks finished");
    }
}

/// 终止所有在途轮询（必须先于 StoreCleanup 注册）
struct PollDrainCleanup {
    orchestrator: Orchestrator,
}

impl PollDrainCleanup {
    fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for PollDrainCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        let drained = self.orchestrator.drain_all().await;
        tracing::info!(drained, "Active polls drained");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PollDrain"
    }
}

/// 关闭会话存储
struct StoreCleanup {
    store: Arc<dyn SessionStore>,
}

impl StoreCleanup {
    fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for StoreCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.store.close().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SessionStore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ProbeStatus, ScriptedProbe};
    use crate::core::SystemClock;
    use crate::notify::NotificationDispatcher;
    use crate::poller::PollSettings;
    use crate::store::{MemorySessionStore, NewSession, SessionStatus};

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!token.is_cancelled());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(manager.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_reason_is_broadcast() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        manager.shutdown(ShutdownReason::Signal);
        assert_eq!(rx.try_recv().unwrap(), ShutdownReason::Signal);

        // 触发之后才订阅的收不到原因
        let mut late = manager.subscribe();
        assert!(late.try_recv().is_err());
    }

    struct OrderCleanup {
        label: &'static str,
        log: Log,
    }

    #[async_trait::async_trait]
    impl ShutdownCleanup for OrderCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.label);
            match self.label {
                "fails" => anyhow::bail!("cleanup failed"),
                "hangs" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    self.log.lock().unwrap().push("hangs finished");
                    Ok(())
                }
                _ => Ok(()),
            }
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    type Log = Arc<std::sync::Mutex<Vec<&'static str>>>;

    fn coordinator_with(labels: &[&'static str]) -> (ShutdownCoordinator, Log) {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut coordinator = ShutdownCoordinator::new();
        for &label in labels {
            coordinator.register(OrderCleanup {
                label,
                log: log.clone(),
            });
        }
        (coordinator, log)
    }

    #[tokio::test]
    async fn test_coordinator_runs_in_order_despite_failures() {
        let (coordinator, log) = coordinator_with(&["first", "fails", "last"]);
        coordinator.run_cleanup().await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "fails", "last"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coordinator_abandons_hung_task_and_continues() {
        let (coordinator, log) = coordinator_with(&["hangs", "last"]);
        let started = tokio::time::Instant::now();
        coordinator.run_cleanup().await;

        assert_eq!(*log.lock().unwrap(), vec!["hangs", "last"]);
        let elapsed = started.elapsed();
        assert!(elapsed >= CLEANUP_TIMEOUT && elapsed < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_then_close_store() {
        let store = Arc::new(MemorySessionStore::new());
        store.insert(NewSession::new("s1", "h1", "t")).await.unwrap();
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(ScriptedProbe::new(ProbeStatus::Busy)),
            NotificationDispatcher::disabled(),
            Arc::new(SystemClock),
            PollSettings::default(),
        );
        orchestrator.start("s1", "h1", None).await.unwrap();

        ShutdownCoordinator::for_service(orchestrator.clone(), store.clone())
            .run_cleanup()
            .await;

        assert_eq!(orchestrator.active_count().await, 0);
        let session = store.get("s1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
    }
}

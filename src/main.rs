//! Build & Learn 后端
//!
//! 入口：加载配置、打开会话存储、连接 OpenCode，启动 HTTP 服务；
//! 收到 Ctrl+C / SIGTERM 后先停止接收请求，再清空在途轮询，最后关闭存储。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use buildlearn::agent::{AgentService, AgentStatusProbe, OpencodeClient};
use buildlearn::config::load_config;
use buildlearn::core::{ShutdownCoordinator, ShutdownManager, SystemClock};
use buildlearn::notify::{NotificationChannel, NotificationDispatcher, TelegramChannel};
use buildlearn::poller::{Orchestrator, PollSettings};
use buildlearn::server::{create_router, AppState};
use buildlearn::store::{SessionStore, SqliteSessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    buildlearn::observability::init();

    // 可选：第一个参数为额外配置文件
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let clock = Arc::new(SystemClock);
    let store: Arc<dyn SessionStore> = Arc::new(
        SqliteSessionStore::open(&cfg.database.path)
            .with_context(|| format!("Failed to open database {}", cfg.database.path.display()))?,
    );
    let agent: Arc<dyn AgentService> = Arc::new(
        OpencodeClient::new(&cfg.opencode.url, cfg.opencode.request_timeout_secs)
            .context("Failed to build OpenCode client")?,
    );

    let channel: Option<Arc<dyn NotificationChannel>> = match cfg.telegram.resolve_token() {
        Some(token) => Some(Arc::new(
            TelegramChannel::new(&cfg.telegram.api_base, &token)
                .context("Failed to build Telegram channel")?,
        )),
        None => {
            tracing::warn!("Telegram bot token not configured, notifications disabled");
            None
        }
    };

    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(AgentStatusProbe::new(agent.clone())),
        NotificationDispatcher::new(channel),
        clock.clone(),
        PollSettings::from(&cfg.poller),
    );

    if !agent.health().await {
        tracing::warn!(url = %cfg.opencode.url, "OpenCode is not reachable yet");
    }

    let state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
        store: store.clone(),
        agent,
        opencode_url: cfg.opencode.url.clone(),
        intake: cfg.intake.clone(),
        clock,
    });
    let app = create_router(state);

    let shutdown = Arc::new(ShutdownManager::new());
    let mut reasons = shutdown.subscribe();
    shutdown.install_signal_handlers();

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!(
        bind = %cfg.server.bind,
        opencode = %cfg.opencode.url,
        "Build & Learn backend listening"
    );

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("HTTP server error")?;

    match reasons.try_recv() {
        Ok(reason) => tracing::info!(?reason, "Shutting down"),
        Err(_) => tracing::warn!("HTTP server stopped without a shutdown signal"),
    }

    ShutdownCoordinator::for_service(orchestrator, store)
        .run_cleanup()
        .await;

    tracing::info!("Goodbye");
    Ok(())
}

//! HTTP 入口：研究请求提交、会话查询、健康检查
//!
//! 路由只做编排：校验 → 创建 Agent 会话 → 入库 → 提交 Prompt → 交给 Orchestrator 跟踪。

mod routes;

use std::sync::Arc;

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::AgentService;
use crate::config::IntakeSection;
use crate::core::Clock;
use crate::poller::Orchestrator;
use crate::store::SessionStore;

/// 路由共享状态
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn SessionStore>,
    pub agent: Arc<dyn AgentService>,
    /// 健康检查里回显的 Agent 服务地址
    pub opencode_url: String,
    pub intake: IntakeSection,
    pub clock: Arc<dyn Clock>,
}

/// 构建路由（浏览器扩展跨域调用，CORS 放开）
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    Router::new()
        .route("/api/health", get(routes::health))
        .route(
            "/api/learn",
            get(routes::list_sessions).post(routes::submit_research),
        )
        .route("/api/learn/:id", get(routes::get_session))
        .fallback(routes::not_found)
        .layer(cors)
        .with_state(state)
}

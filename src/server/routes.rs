//! /api 路由处理函数

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::intake::{generate_research_prompt, generate_session_title, ResearchPayload};
use crate::store::{NewSession, Session, SessionStatus};

/// 统一的 `{ "error": ... }` 响应
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitResponse {
    success: bool,
    request_id: String,
    session_id: String,
    title: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionList {
    sessions: Vec<Session>,
    total: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    limit: Option<String>,
}

/// POST /api/learn
///
/// 请求体解析失败（缺少 Content-Type、JSON 语法错误、字段类型不符）统一返回 400。
pub(crate) async fn submit_research(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResearchPayload>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(payload) =
        payload.map_err(|rej| ApiError::new(StatusCode::BAD_REQUEST, rej.body_text()))?;
    let now = state.clock.now();
    let id = uuid::Uuid::new_v4().to_string();
    let request = payload
        .validate(id, now)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    let title = generate_session_title(&request, now);
    let prompt = generate_research_prompt(&request, &state.intake.research_root, now);

    let handle = match state.agent.create_unit(&title).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(request_id = %request.id, "Failed to create agent session: {}", e);
            return Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to create OpenCode session. Is OpenCode running?",
            ));
        }
    };

    let new_session = NewSession::new(request.id.clone(), handle.clone(), title.clone())
        .with_notify_target(request.telegram_chat_id);
    if let Err(e) = state.store.insert(new_session).await {
        tracing::error!(request_id = %request.id, "Failed to insert session: {}", e);
        return Err(ApiError::internal());
    }

    if !state.agent.submit_instructions(&handle, &prompt).await {
        // 不会再被轮询，直接落到终态
        if let Err(e) = state
            .store
            .update_status(&request.id, SessionStatus::Failed, None)
            .await
        {
            tracing::error!(request_id = %request.id, "Failed to mark session failed: {}", e);
        }
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to send prompt to OpenCode",
        ));
    }

    if let Err(e) = state
        .orchestrator
        .start(&request.id, &handle, request.telegram_chat_id)
        .await
    {
        tracing::error!(request_id = %request.id, "Failed to start polling: {}", e);
        return Err(ApiError::internal());
    }

    tracing::info!(request_id = %request.id, session = %handle, title = %title, "Research started");

    Ok(Json(SubmitResponse {
        success: true,
        request_id: request.id,
        session_id: handle,
        title,
    }))
}

/// GET /api/learn?limit=N
pub(crate) async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SessionList>, ApiError> {
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(state.intake.list_limit_default)
        .min(state.intake.list_limit_max);

    let sessions = state.store.list(limit).await.map_err(|e| {
        tracing::error!("List sessions error: {}", e);
        ApiError::internal()
    })?;
    let total = sessions.len();
    Ok(Json(SessionList { sessions, total }))
}

/// GET /api/learn/:id
pub(crate) async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    match state.store.get(&id).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err(ApiError::new(StatusCode::NOT_FOUND, "Session not found")),
        Err(e) => {
            tracing::error!(session_id = %id, "Get session error: {}", e);
            Err(ApiError::internal())
        }
    }
}

/// GET /api/health
pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let connected = state.agent.health().await;
    let active_polls = state.orchestrator.active_count().await;
    Json(json!({
        "status": "ok",
        "opencode": if connected { "connected" } else { "disconnected" },
        "opencodeUrl": state.opencode_url,
        "activePolls": active_polls,
        "timestamp": state.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub(crate) async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

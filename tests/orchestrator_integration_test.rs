//! 编排器集成测试：HTTP 入口 → Agent → 轮询 → 存储 → 通知

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use buildlearn::agent::{AgentStatusProbe, MockAgentService, SessionActivity};
use buildlearn::config::IntakeSection;
use buildlearn::core::{ShutdownCoordinator, SystemClock};
use buildlearn::notify::{failure_message, success_message, NotificationDispatcher, RecordingChannel};
use buildlearn::poller::{Orchestrator, PollSettings, TIMEOUT_REASON};
use buildlearn::server::{create_router, AppState};
use buildlearn::store::{
    MemorySessionStore, NewSession, SessionStatus, SessionStore, SqliteSessionStore,
};

struct App {
    state: Arc<AppState>,
    agent: Arc<MockAgentService>,
    channel: Arc<RecordingChannel>,
}

fn app_with_store(store: Arc<dyn SessionStore>) -> App {
    let agent = Arc::new(MockAgentService::new());
    let channel = Arc::new(RecordingChannel::new());
    let clock = Arc::new(SystemClock);
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(AgentStatusProbe::new(agent.clone())),
        NotificationDispatcher::new(Some(channel.clone())),
        clock.clone(),
        PollSettings::default(),
    );
    let state = Arc::new(AppState {
        orchestrator,
        store,
        agent: agent.clone(),
        opencode_url: "http://localhost:4096".to_string(),
        intake: IntakeSection::default(),
        clock,
    });
    App {
        state,
        agent,
        channel,
    }
}

async fn call(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = create_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn submit(state: &Arc<AppState>, body: Value) -> Value {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/learn")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = call(state, req).await;
    assert_eq!(status, StatusCode::OK, "submit failed: {}", body);
    body
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_submitted_research_completes_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteSessionStore::open(dir.path().join("history.db")).unwrap());
    let app = app_with_store(store.clone());

    let body = submit(
        &app.state,
        json!({
            "type": "url",
            "source": "telegram",
            "url": "https://github.com/tokio-rs/tokio",
            "telegramChatId": 7
        }),
    )
    .await;
    let request_id = body["requestId"].as_str().unwrap().to_string();
    let handle = body["sessionId"].as_str().unwrap().to_string();

    // Agent 仍在工作
    advance(12).await;
    assert_eq!(app.state.orchestrator.active_count().await, 1);

    app.agent.set_activity(&handle, SessionActivity::Idle);
    advance(5).await;
    assert_eq!(app.state.orchestrator.active_count().await, 0);

    let req = Request::builder()
        .uri(format!("/api/learn/{}", request_id))
        .body(Body::empty())
        .unwrap();
    let (status, session) = call(&app.state, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "completed");
    assert!(session["completedAt"].is_string());

    let sent = app.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, 7);
    assert_eq!(
        sent[0].text,
        success_message("Build & Learn: github.com - tokio-rs / tokio", None)
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_unknown_to_agent_counts_as_idle() {
    let app = app_with_store(Arc::new(MemorySessionStore::new()));
    let body = submit(
        &app.state,
        json!({ "type": "x_post", "source": "chrome_extension", "text": "tiny idea" }),
    )
    .await;
    let handle = body["sessionId"].as_str().unwrap();

    app.agent.forget(handle);
    advance(6).await;

    let id = body["requestId"].as_str().unwrap();
    let session = app.state.store.get(id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    // 没有通知目标
    assert_eq!(app.channel.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_agent_times_out_with_failure_notice() {
    let app = app_with_store(Arc::new(MemorySessionStore::new()));
    let body = submit(
        &app.state,
        json!({ "type": "url", "source": "telegram", "url": "https://example.com/post", "telegramChatId": 3 }),
    )
    .await;
    let id = body["requestId"].as_str().unwrap();

    app.agent.set_status_failing(true);
    advance(30 * 60 - 5).await;
    assert_eq!(app.state.orchestrator.active_count().await, 1);

    advance(10).await;
    assert_eq!(app.state.orchestrator.active_count().await, 0);
    let session = app.state.store.get(id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);

    let sent = app.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].text,
        failure_message("Build & Learn: example.com - post", Some(TIMEOUT_REASON))
    );
}

#[tokio::test(start_paused = true)]
async fn test_completion_message_carries_recorded_report_path() {
    let store = Arc::new(MemorySessionStore::new());
    let app = app_with_store(store.clone());
    store
        .insert(NewSession::new("s1", "h1", "Deep dive").with_notify_target(Some(11)))
        .await
        .unwrap();
    store
        .record_artifact("s1", "./research/deep-dive/REPORT.md")
        .await;
    app.agent.set_activity("h1", SessionActivity::Busy);

    app.state.orchestrator.start("s1", "h1", Some(11)).await.unwrap();
    advance(6).await;
    assert_eq!(app.state.orchestrator.active_count().await, 1);
    app.agent.set_activity("h1", SessionActivity::Idle);
    advance(6).await;

    let sent = app.channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].text,
        success_message("Deep dive", Some("./research/deep-dive/REPORT.md"))
    );
    let session = store.get("s1").await.unwrap().unwrap();
    assert_eq!(session.artifact_path.as_deref(), Some("./research/deep-dive/REPORT.md"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_polls_then_closes_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteSessionStore::open(dir.path().join("history.db")).unwrap());
    let app = app_with_store(store.clone());

    let mut ids = Vec::new();
    for url in ["https://a.com/one", "https://b.com/two"] {
        let body = submit(
            &app.state,
            json!({ "type": "url", "source": "telegram", "url": url, "telegramChatId": 1 }),
        )
        .await;
        ids.push(body["requestId"].as_str().unwrap().to_string());
    }
    assert_eq!(app.state.orchestrator.active_count().await, 2);

    ShutdownCoordinator::for_service(app.state.orchestrator.clone(), store.clone())
        .run_cleanup()
        .await;
    assert_eq!(app.state.orchestrator.active_count().await, 0);

    // 清空后的定时器不再触发
    advance(3600).await;
    assert_eq!(app.channel.attempts(), 0);

    let reopened = SqliteSessionStore::open(dir.path().join("history.db")).unwrap();
    for id in &ids {
        let session = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
    }
}

//! SQLite 会话存储（rusqlite，单连接 + 互斥锁）
//!
//! 表结构沿用历史库 `research/history.db`：sessions 表按 id 主键，status / created_at 建索引。
//! 时间以 RFC 3339（毫秒、Z 结尾）文本存储，字典序即时间序。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{NewSession, Session, SessionStatus, SessionStore};
use crate::core::{Clock, StoreError, SystemClock};

const SELECT_COLUMNS: &str = "id, request_id, opencode_session_id, status, title, report_path, \
                              telegram_chat_id, created_at, completed_at";

/// SQLite 会话存储
pub struct SqliteSessionStore {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SqliteSessionStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        init_schema(&conn)?;
        tracing::info!("Opened session database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
            clock,
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Closed),
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            opencode_session_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            title TEXT NOT NULL,
            report_path TEXT,
            telegram_chat_id INTEGER,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at DESC);",
    )?;
    Ok(())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn session_from_row(row: &Row<'_>) -> Result<Session, StoreError> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    Ok(Session {
        id: row.get("id")?,
        request_id: row.get("request_id")?,
        external_handle: row.get("opencode_session_id")?,
        status: status.parse()?,
        title: row.get("title")?,
        artifact_path: row.get("report_path")?,
        notify_target: row.get("telegram_chat_id")?,
        created_at: parse_ts(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
    })
}

fn query_one(conn: &Connection, sql: &str, key: &str) -> Result<Option<Session>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![key])?;
    let session = match rows.next()? {
        Some(row) => Some(session_from_row(row)?),
        None => None,
    };
    Ok(session)
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, new: NewSession) -> Result<Session, StoreError> {
        let created_at = self.clock.now();
        self.with_conn(|conn| {
            let exists: Option<String> = conn
                .query_row("SELECT id FROM sessions WHERE id = ?1", params![new.id], |r| r.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Duplicate(new.id.clone()));
            }
            conn.execute(
                "INSERT INTO sessions (id, request_id, opencode_session_id, status, title, telegram_chat_id, created_at)
                 VALUES (?1, ?2, ?3, 'processing', ?4, ?5, ?6)",
                params![
                    new.id,
                    new.request_id,
                    new.external_handle,
                    new.title,
                    new.notify_target,
                    format_ts(created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(Session {
            id: new.id,
            request_id: new.request_id,
            external_handle: new.external_handle,
            status: SessionStatus::Processing,
            title: new.title,
            artifact_path: None,
            notify_target: new.notify_target,
            created_at,
            completed_at: None,
        })
    }

    async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
        artifact_path: Option<&str>,
    ) -> Result<bool, StoreError> {
        let artifact = if status == SessionStatus::Completed {
            artifact_path
        } else {
            None
        };
        let completed_at = status.is_terminal().then(|| format_ts(self.clock.now()));
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     report_path = COALESCE(?2, report_path),
                     completed_at = COALESCE(?3, completed_at)
                 WHERE id = ?4 AND status NOT IN ('completed', 'failed')",
                params![status.as_str(), artifact, completed_at, id],
            )?;
            Ok(changed > 0)
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT {} FROM sessions WHERE id = ?1", SELECT_COLUMNS);
        self.with_conn(|conn| query_one(conn, &sql, id))
    }

    async fn list(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let sql = format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC LIMIT ?1",
            SELECT_COLUMNS
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![limit as i64])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(session_from_row(row)?);
            }
            Ok(sessions)
        })
    }

    async fn get_by_external_handle(&self, handle: &str) -> Result<Option<Session>, StoreError> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE opencode_session_id = ?1",
            SELECT_COLUMNS
        );
        self.with_conn(|conn| query_one(conn, &sql, handle))
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            tracing::info!("Closed session database {}", self.path.display());
        }
        Ok(())
    }
}

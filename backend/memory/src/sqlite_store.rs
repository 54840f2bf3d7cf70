/// SQLite-backed durable session store.
///
/// Sessions live in a `chat_sessions` table keyed by `(session_id, user_id)`.
/// Messages and state are stored as JSON columns; timestamps as RFC 3339 text
/// with nanosecond precision so they sort lexically.
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info};

use chatitp_core::{ChatSession, SessionRepository, SessionSummary};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chat_sessions (
         session_id    TEXT NOT NULL,
         user_id       TEXT NOT NULL,
         messages_json TEXT NOT NULL,
         state_json    TEXT NOT NULL,
         created_at    TEXT NOT NULL,
         updated_at    TEXT NOT NULL,
         PRIMARY KEY (session_id, user_id)
     );
     CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, updated_at);";

pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .context("Failed to open SQLite session database")?;

        conn.execute_batch(&format!("PRAGMA journal_mode=WAL;\n{SCHEMA}"))
            .context("Failed to initialize chat_sessions schema")?;

        info!("SqliteSessionStore opened at {:?}", path.as_ref());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[async_trait]
impl SessionRepository for SqliteSessionStore {
    async fn upsert(&self, session: &ChatSession) -> Result<()> {
        let conn = self.conn.lock().await;
        let messages_json = serde_json::to_string(&session.messages)?;
        let state_json = serde_json::to_string(&session.state)?;
        conn.execute(
            "INSERT INTO chat_sessions (session_id, user_id, messages_json, state_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(session_id, user_id) DO UPDATE SET
                 messages_json = excluded.messages_json,
                 state_json    = excluded.state_json,
                 updated_at    = excluded.updated_at",
            params![
                session.session_id,
                session.user_id,
                messages_json,
                state_json,
                timestamp(&session.created_at),
                timestamp(&session.updated_at),
            ],
        )?;
        debug!("Upserted session {}", session.session_id);
        Ok(())
    }

    async fn find(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
        let conn = self.conn.lock().await;
        let session = conn
            .query_row(
                "SELECT session_id, user_id, messages_json, state_json, created_at, updated_at
                 FROM chat_sessions WHERE session_id = ?1 AND user_id = ?2",
                params![session_id, user_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT session_id, user_id, messages_json, state_json, created_at, updated_at
             FROM chat_sessions WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let summaries = stmt
            .query_map(params![user_id], row_to_session)?
            .filter_map(|r| r.ok())
            .map(|s| s.summary())
            .collect();
        Ok(summaries)
    }
}

// ---------------------------------------------------------------------------
// Row deserialization helper
// ---------------------------------------------------------------------------

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<ChatSession> {
    let session_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let messages_json: String = row.get(2)?;
    let state_json: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    let bad = |e: String| rusqlite::Error::InvalidParameterName(e);
    let messages = serde_json::from_str(&messages_json).map_err(|e| bad(e.to_string()))?;
    let state = serde_json::from_str(&state_json).map_err(|e| bad(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| bad(e.to_string()))?
        .with_timezone(&Utc);
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| bad(e.to_string()))?
        .with_timezone(&Utc);

    Ok(ChatSession { session_id, user_id, messages, state, created_at, updated_at })
}

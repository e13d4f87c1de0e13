use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, types::Type, Connection, Result as DbResult, Row};
use std::sync::MutexGuard;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::db::connection::{get_connection, get_in_memory_connection, DbPool};
use crate::db::models::{Message, Role, Session};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Storage error: {0}")]
    Storage(#[from] duckdb::Error),
}

/// Durable record of sessions and their ordered messages.
///
/// Every mutating call is a single autocommitted statement, so a value
/// returned from one call is visible to the next.
#[derive(Clone)]
pub struct MessageStore {
    pool: DbPool,
}

impl MessageStore {
    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pool: get_connection(config)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            pool: get_in_memory_connection()?,
        })
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements autocommit, so a poisoned lock still guards a consistent connection.
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Session Operations ---

    pub fn create_session(&self) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (id, created_at) VALUES (?, ?)",
            params![id.to_string(), now_timestamp()],
        )?;
        debug!("Created session {}", id);
        Ok(id)
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let conn = self.conn();
        Ok(fetch_session(&conn, id)?)
    }

    /// Newest first.
    pub fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, created_at FROM sessions ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], row_to_session)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    // --- Message Operations ---

    pub fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<i64, StoreError> {
        let role: Role = role.parse().map_err(StoreError::InvalidArgument)?;

        let conn = self.conn();
        ensure_session(&conn, session_id)?;

        let id: i64 = conn.query_row(
            "INSERT INTO messages (session_id, role, content, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
            params![session_id.to_string(), role.as_str(), content, now_timestamp()],
            |row| row.get(0),
        )?;
        debug!("Appended {} message {} to session {}", role, id, session_id);
        Ok(id)
    }

    pub fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn();
        ensure_session(&conn, session_id)?;

        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at
             FROM messages
             WHERE session_id = ?
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// The transcript in the shape a provider consumes.
    pub fn list_messages_as_pairs(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<(Role, String)>, StoreError> {
        Ok(self
            .list_messages(session_id)?
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect())
    }
}

fn ensure_session(conn: &Connection, session_id: Uuid) -> Result<(), StoreError> {
    match fetch_session(conn, session_id)? {
        Some(_) => Ok(()),
        None => Err(StoreError::InvalidArgument(format!("unknown session {}", session_id))),
    }
}

fn fetch_session(conn: &Connection, id: Uuid) -> DbResult<Option<Session>> {
    let mut stmt = conn.prepare("SELECT id, created_at FROM sessions WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id.to_string()], row_to_session)?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

fn row_to_session(row: &Row) -> DbResult<Session> {
    Ok(Session {
        id: parse_uuid(row, 0)?,
        created_at: parse_timestamp(row, 1)?,
    })
}

fn row_to_message(row: &Row) -> DbResult<Message> {
    let role: String = row.get(2)?;
    let role = role
        .parse::<Role>()
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;

    Ok(Message {
        id: row.get(0)?,
        session_id: parse_uuid(row, 1)?,
        role,
        content: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
    })
}

fn parse_uuid(row: &Row, idx: usize) -> DbResult<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: uuid::Error| {
        duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

// Timestamps are kept as RFC 3339 text so they round-trip without driver-specific conversions.
fn parse_timestamp(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

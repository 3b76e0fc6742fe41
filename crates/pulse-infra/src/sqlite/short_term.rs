//! SQLite Short-Term Store.
//!
//! Implements `ShortTermStore` from `pulse-core`. Sessions carry a sliding
//! `expires_at`; every append pushes it forward by the TTL. Expired sessions
//! are reclaimed here, by `DELETE ... WHERE expires_at <= now` on the write
//! path, and their messages go with them through `ON DELETE CASCADE`.

use chrono::Utc;
use sqlx::Row;

use pulse_core::chat::short_term::ShortTermStore;
use pulse_types::chat::{ChatMessage, Session};
use pulse_types::error::RepositoryError;
use pulse_types::llm::{MessageRole, ToolCall};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `ShortTermStore`.
pub struct SqliteShortTermStore {
    pool: DatabasePool,
    ttl: chrono::Duration,
}

impl SqliteShortTermStore {
    pub fn new(pool: DatabasePool, ttl: chrono::Duration) -> Self {
        Self { pool, ttl }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    id: String,
    user_id: String,
    created_at: String,
    expires_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            created_at: parse_datetime(&self.created_at)?,
            expires_at: parse_datetime(&self.expires_at)?,
        })
    }
}

struct MessageRow {
    session_id: String,
    role: String,
    content: String,
    tool_calls: Option<String>,
    tool_call_id: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            tool_calls: row.try_get("tool_calls")?,
            tool_call_id: row.try_get("tool_call_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let role: MessageRole = self.role.parse().map_err(RepositoryError::Query)?;
        let tool_calls: Vec<ToolCall> = match self.tool_calls.as_deref() {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| RepositoryError::Query(format!("invalid tool_calls: {e}")))?,
            None => Vec::new(),
        };

        Ok(ChatMessage {
            session_id: self.session_id,
            role,
            content: self.content,
            tool_calls,
            tool_call_id: self.tool_call_id,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ShortTermStore implementation
// ---------------------------------------------------------------------------

impl ShortTermStore for SqliteShortTermStore {
    async fn ensure_session(&self, session_id: &str, user_id: &str) -> Result<Session, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let reaped = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(format_datetime(&now))
            .execute(&mut *tx)
            .await
            .map_err(query_error)?
            .rows_affected();
        if reaped > 0 {
            tracing::debug!(reaped, "Reclaimed expired sessions");
        }

        sqlx::query(
            r#"INSERT INTO sessions (id, user_id, created_at, expires_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(format_datetime(&now))
        .bind(format_datetime(&(now + self.ttl)))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
        let session = SessionRow::from_row(&row)
            .map_err(query_error)?
            .into_session()?;

        tx.commit().await.map_err(query_error)?;

        if session.user_id != user_id {
            return Err(RepositoryError::Conflict(format!(
                "session '{session_id}' belongs to another user"
            )));
        }
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ? AND expires_at > ?")
            .bind(session_id)
            .bind(format_datetime(&Utc::now()))
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|row| SessionRow::from_row(&row).map_err(query_error)?.into_session())
            .transpose()
    }

    async fn append(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&message.tool_calls)
                    .map_err(|e| RepositoryError::Query(format!("failed to encode tool_calls: {e}")))?,
            )
        };

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let slid = sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ? AND expires_at > ?")
            .bind(format_datetime(&(now + self.ttl)))
            .bind(&message.session_id)
            .bind(format_datetime(&now))
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        if slid.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r#"INSERT INTO short_term_messages (session_id, role, content, tool_calls, tool_call_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message.session_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(tool_calls)
        .bind(&message.tool_call_id)
        .bind(format_datetime(&message.created_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)
    }

    async fn read(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT m.* FROM short_term_messages m
               JOIN sessions s ON s.id = m.session_id
               WHERE m.session_id = ? AND s.expires_at > ?
               ORDER BY m.seq DESC
               LIMIT ?"#,
        )
        .bind(session_id)
        .bind(format_datetime(&Utc::now()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let message_row = MessageRow::from_row(row).map_err(query_error)?;
            messages.push(message_row.into_message()?);
        }
        Ok(messages)
    }

    async fn clear(&self, session_id: &str) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM short_term_messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;

        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(count as u64)
    }
}

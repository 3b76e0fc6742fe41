//! ShortTermStore trait definition and an in-process implementation.
//!
//! The Short-Term Store keeps a session's raw message log in insertion order.
//! A session expires after a sliding inactivity window: every append pushes
//! `expires_at` forward. Expired sessions read as empty and are reclaimed by
//! the store itself, never by callers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use pulse_types::chat::{ChatMessage, Session};
use pulse_types::error::RepositoryError;

/// Repository trait for session-scoped message logs.
///
/// Implementations live in pulse-infra (e.g., `SqliteShortTermStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ShortTermStore: Send + Sync {
    /// Return the live session with this id, creating it if missing or expired.
    ///
    /// Fails with [`RepositoryError::Conflict`] if a live session with this id
    /// belongs to a different user.
    fn ensure_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Session, RepositoryError>> + Send;

    /// Get a live session by id.
    fn get_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Append a message to its session's log and slide the session's expiry.
    ///
    /// Fails with [`RepositoryError::NotFound`] if the session is missing or expired.
    fn append(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The last `limit` messages of a session, oldest first.
    fn read(
        &self,
        session_id: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Delete a session and its log. Returns the number of messages removed.
    fn clear(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

struct SessionLog {
    session: Session,
    messages: Vec<ChatMessage>,
}

/// Dashmap-backed Short-Term Store with lazy expiry.
pub struct InMemoryShortTermStore {
    sessions: DashMap<String, SessionLog>,
    ttl: chrono::Duration,
}

impl InMemoryShortTermStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn reap(&self, now: DateTime<Utc>) {
        self.sessions.retain(|_, log| !log.session.is_expired(now));
    }
}

impl ShortTermStore for InMemoryShortTermStore {
    async fn ensure_session(&self, session_id: &str, user_id: &str) -> Result<Session, RepositoryError> {
        let now = Utc::now();
        self.reap(now);

        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionLog {
                session: Session {
                    id: session_id.to_string(),
                    user_id: user_id.to_string(),
                    created_at: now,
                    expires_at: now + self.ttl,
                },
                messages: Vec::new(),
            });

        if entry.session.user_id != user_id {
            return Err(RepositoryError::Conflict(format!(
                "session '{session_id}' belongs to another user"
            )));
        }
        Ok(entry.session.clone())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, RepositoryError> {
        let now = Utc::now();
        Ok(self
            .sessions
            .get(session_id)
            .map(|log| log.session.clone())
            .filter(|s| !s.is_expired(now)))
    }

    async fn append(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut log = self
            .sessions
            .get_mut(&message.session_id)
            .filter(|log| !log.session.is_expired(now))
            .ok_or(RepositoryError::NotFound)?;

        log.messages.push(message.clone());
        log.session.expires_at = now + self.ttl;
        Ok(())
    }

    async fn read(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let now = Utc::now();
        let Some(log) = self.sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        if log.session.is_expired(now) {
            return Ok(Vec::new());
        }
        let skip = log.messages.len().saturating_sub(limit);
        Ok(log.messages[skip..].to_vec())
    }

    async fn clear(&self, session_id: &str) -> Result<u64, RepositoryError> {
        Ok(self
            .sessions
            .remove(session_id)
            .map(|(_, log)| log.messages.len() as u64)
            .unwrap_or(0))
    }
}

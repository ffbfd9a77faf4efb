use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::AuthSession;

#[derive(Debug, Clone, Error)]
pub enum SessionStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for SessionStoreError {
    fn from(e: sqlx::Error) -> Self {
        SessionStoreError::DatabaseError(e.to_string())
    }
}

/// Persistence for banking-portal sessions, so that a restarted process can pick up an unexpired session instead of
/// logging in again. Sessions are keyed by channel; there is at most one per channel.
pub trait SessionStore: Send + Sync {
    fn load_session(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<Option<AuthSession>, SessionStoreError>> + Send;

    /// Inserts or replaces the session for `session.channel`.
    fn save_session(&self, session: &AuthSession) -> impl Future<Output = Result<(), SessionStoreError>> + Send;

    fn touch_session(
        &self,
        channel: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), SessionStoreError>> + Send;

    fn clear_session(&self, channel: &str) -> impl Future<Output = Result<(), SessionStoreError>> + Send;
}

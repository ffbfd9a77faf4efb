use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::AuthSession;

pub async fn fetch_session(channel: &str, conn: &mut SqliteConnection) -> Result<Option<AuthSession>, sqlx::Error> {
    let session =
        sqlx::query_as("SELECT * FROM auth_sessions WHERE channel = $1").bind(channel).fetch_optional(conn).await?;
    Ok(session)
}

pub async fn upsert_session(session: &AuthSession, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO auth_sessions (
                channel,
                session_token,
                csrf_token,
                cookies,
                expires_at,
                idle_timeout_secs,
                last_activity_at,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (channel) DO UPDATE SET
                session_token = excluded.session_token,
                csrf_token = excluded.csrf_token,
                cookies = excluded.cookies,
                expires_at = excluded.expires_at,
                idle_timeout_secs = excluded.idle_timeout_secs,
                last_activity_at = excluded.last_activity_at,
                created_at = excluded.created_at;
        "#,
    )
    .bind(&session.channel)
    .bind(&session.session_token)
    .bind(&session.csrf_token)
    .bind(&session.cookies)
    .bind(session.expires_at)
    .bind(session.idle_timeout_secs)
    .bind(session.last_activity_at)
    .bind(session.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn touch_session(channel: &str, at: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE auth_sessions SET last_activity_at = $2 WHERE channel = $1")
        .bind(channel)
        .bind(at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete_session(channel: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM auth_sessions WHERE channel = $1").bind(channel).execute(conn).await?;
    Ok(())
}

use chrono::Utc;
use sqlx::SqliteConnection;

pub async fn create_user(display_name: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar("INSERT INTO users (display_name, created_at) VALUES ($1, $2) RETURNING id")
        .bind(display_name)
        .bind(Utc::now())
        .fetch_one(conn)
        .await?;
    Ok(id)
}

use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{Rial, UserWallet};

/// Adds `amount` to the user's wallet, creating the wallet if this is the first credit. Returns the updated wallet.
pub async fn credit_wallet(
    user_id: i64,
    amount: Rial,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<UserWallet, sqlx::Error> {
    let wallet: UserWallet = sqlx::query_as(
        r#"
            INSERT INTO user_wallets (user_id, balance, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(at)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Wallet for user #{user_id} credited with {amount}. New balance: {}", wallet.balance);
    Ok(wallet)
}

pub async fn fetch_wallet(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserWallet>, sqlx::Error> {
    let wallet =
        sqlx::query_as("SELECT * FROM user_wallets WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(wallet)
}

use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{CryptoPayment, NewCryptoPayment};

pub async fn insert_crypto_payment(
    payment: NewCryptoPayment,
    conn: &mut SqliteConnection,
) -> Result<CryptoPayment, sqlx::Error> {
    let now = Utc::now();
    let payment: CryptoPayment = sqlx::query_as(
        r#"
            INSERT INTO crypto_payments (
                transaction_id,
                address,
                private_key,
                asset,
                expected_amount,
                expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(payment.transaction_id)
    .bind(payment.address)
    .bind(payment.private_key)
    .bind(payment.asset)
    .bind(payment.expected_amount)
    .bind(payment.expires_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Crypto payment #{} for {} inserted", payment.id, payment.address);
    Ok(payment)
}

pub async fn fetch_crypto_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<CryptoPayment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM crypto_payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_for_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CryptoPayment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM crypto_payments WHERE address = $1")
        .bind(address)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_pending_unexpired(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<CryptoPayment>, sqlx::Error> {
    let payments = sqlx::query_as(
        "SELECT * FROM crypto_payments WHERE status = 'pending' AND expires_at > $1 ORDER BY expires_at ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

pub async fn complete_if_pending(id: i64, conn: &mut SqliteConnection) -> Result<Option<CryptoPayment>, sqlx::Error> {
    let payment = sqlx::query_as(
        "UPDATE crypto_payments SET status = 'completed', updated_at = $2 WHERE id = $1 AND status = 'pending' \
         RETURNING *",
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Completes the crypto payment at `address` if it is still pending. Used when an order is settled through its wallet
/// address rather than through the crypto payment record.
pub async fn complete_for_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CryptoPayment>, sqlx::Error> {
    let payment = sqlx::query_as(
        "UPDATE crypto_payments SET status = 'completed', updated_at = $2 WHERE address = $1 AND status = 'pending' \
         RETURNING *",
    )
    .bind(address)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Marks every pending payment whose deadline has passed as expired, and returns them.
pub async fn expire_overdue(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<CryptoPayment>, sqlx::Error> {
    let payments = sqlx::query_as(
        r#"
            UPDATE crypto_payments SET status = 'expired', updated_at = $1
            WHERE status = 'pending' AND expires_at <= $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

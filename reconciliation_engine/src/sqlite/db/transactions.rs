use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransaction, PaymentType, Rial, Transaction, TransactionStatus},
    traits::SettlementFacts,
};

pub async fn insert_transaction(
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, sqlx::Error> {
    let transaction: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                track_id,
                order_ref,
                user_id,
                amount,
                payment_type,
                dedupe_key,
                description,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *;
        "#,
    )
    .bind(transaction.track_id)
    .bind(transaction.order_ref)
    .bind(transaction.user_id)
    .bind(transaction.amount)
    .bind(transaction.payment_type)
    .bind(transaction.dedupe_key)
    .bind(transaction.description)
    .bind(transaction.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Transaction [{}] inserted with id {}", transaction.track_id, transaction.id);
    Ok(transaction)
}

/// A transaction that is born completed. Used for channels where the payment is only discovered after the fact
/// (statement credits, direct wallet-address payments).
pub struct CompletedTransaction<'a> {
    pub track_id: &'a str,
    pub order_ref: &'a str,
    pub user_id: i64,
    pub amount: Rial,
    pub payment_type: PaymentType,
    pub ref_number: Option<&'a str>,
    pub paid_at: DateTime<Utc>,
    pub dedupe_key: &'a str,
    pub description: Option<&'a str>,
}

/// Inserts a completed transaction, unless one with the same track id or dedupe key already exists. Returns `None` on
/// conflict.
pub async fn insert_completed_if_new(
    transaction: CompletedTransaction<'_>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let now = Utc::now();
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                track_id,
                order_ref,
                user_id,
                amount,
                status,
                payment_type,
                ref_number,
                paid_at,
                dedupe_key,
                description,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(transaction.track_id)
    .bind(transaction.order_ref)
    .bind(transaction.user_id)
    .bind(transaction.amount)
    .bind(TransactionStatus::Completed)
    .bind(transaction.payment_type)
    .bind(transaction.ref_number)
    .bind(transaction.paid_at)
    .bind(transaction.dedupe_key)
    .bind(transaction.description)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(inserted)
}

pub async fn complete_if_pending(
    track_id: &str,
    facts: &SettlementFacts,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = 'completed',
                ref_number = COALESCE($2, ref_number),
                paid_at = $3,
                updated_at = $4
            WHERE track_id = $1 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(track_id)
    .bind(facts.ref_number.as_deref())
    .bind(facts.paid_at)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn complete_by_id_if_pending(
    id: i64,
    facts: &SettlementFacts,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = 'completed',
                ref_number = COALESCE($2, ref_number),
                paid_at = $3,
                updated_at = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(facts.ref_number.as_deref())
    .bind(facts.paid_at)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn cancel_if_pending(
    track_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        "UPDATE transactions SET status = 'cancelled', updated_at = $2 WHERE track_id = $1 AND status = 'pending' \
         RETURNING *",
    )
    .bind(track_id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn cancel_by_id_if_pending(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        "UPDATE transactions SET status = 'cancelled', updated_at = $2 WHERE id = $1 AND status = 'pending' RETURNING *",
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn fetch_transaction(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction =
        sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(transaction)
}

pub async fn fetch_by_track_id(
    track_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction =
        sqlx::query_as("SELECT * FROM transactions WHERE track_id = $1").bind(track_id).fetch_optional(conn).await?;
    Ok(transaction)
}

pub async fn fetch_by_dedupe_key(key: &str, conn: &mut SqliteConnection) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction =
        sqlx::query_as("SELECT * FROM transactions WHERE dedupe_key = $1").bind(key).fetch_optional(conn).await?;
    Ok(transaction)
}

/// The most recent pending transaction paying for the given order reference, if any.
pub async fn fetch_pending_for_order_ref(
    order_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let transaction = sqlx::query_as(
        "SELECT * FROM transactions WHERE order_ref = $1 AND status = 'pending' ORDER BY id DESC LIMIT 1",
    )
    .bind(order_ref)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

pub async fn fetch_pending_by_type_since(
    payment_type: PaymentType,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let transactions = sqlx::query_as(
        r#"
            SELECT * FROM transactions
            WHERE payment_type = $1 AND status = 'pending' AND created_at >= $2
            ORDER BY created_at ASC
        "#,
    )
    .bind(payment_type)
    .bind(since)
    .fetch_all(conn)
    .await?;
    Ok(transactions)
}

use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewOrder, Order, OrderNumber};

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                user_id,
                amount,
                payment_method,
                wallet_address,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.user_id)
    .bind(order.amount)
    .bind(order.payment_method)
    .bind(order.wallet_address)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} inserted with id {}", order.order_number, order.id);
    Ok(order)
}

pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn complete_if_pending(
    order_number: &OrderNumber,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = 'completed', paid_at = $2, updated_at = $3
            WHERE order_number = $1 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(order_number.as_str())
    .bind(paid_at)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn cancel_if_pending(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET status = 'cancelled', updated_at = $2 WHERE order_number = $1 AND status = 'pending' \
         RETURNING *",
    )
    .bind(order_number.as_str())
    .bind(Utc::now())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_pending_crypto_orders(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE payment_method = 'crypto'
              AND status = 'pending'
              AND wallet_address IS NOT NULL
              AND created_at >= $1
            ORDER BY created_at ASC
        "#,
    )
    .bind(since)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

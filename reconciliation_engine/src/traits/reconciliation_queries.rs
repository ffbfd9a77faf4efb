use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{CryptoPayment, Order, OrderNumber, Transaction, UserWallet},
    helpers::PayerHints,
    traits::data_objects::PayerMatch,
};

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        QueryError::DatabaseError(e.to_string())
    }
}

/// Read-only queries the reconcilers use to discover work. Nothing here takes a lock or changes state; every decision
/// made from these results is re-checked by the conditional writes in [`crate::traits::SettlementDatabase`].
pub trait ReconciliationQueries: Send + Sync {
    /// Pending gateway transactions created at or after `since`, oldest first.
    fn fetch_pending_gateway_transactions(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Transaction>, QueryError>> + Send;

    /// Pending crypto payments that have not expired at `now`.
    fn fetch_pending_crypto_payments(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CryptoPayment>, QueryError>> + Send;

    /// Pending orders paid in crypto that carry a wallet address and were created at or after `since`.
    fn fetch_pending_crypto_orders(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Order>, QueryError>> + Send;

    fn fetch_crypto_payment_for_address(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<CryptoPayment>, QueryError>> + Send;

    fn fetch_transaction(&self, id: i64) -> impl Future<Output = Result<Option<Transaction>, QueryError>> + Send;

    fn fetch_transaction_by_track_id(
        &self,
        track_id: &str,
    ) -> impl Future<Output = Result<Option<Transaction>, QueryError>> + Send;

    fn fetch_transaction_by_dedupe_key(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Transaction>, QueryError>> + Send;

    fn fetch_order_by_number(
        &self,
        order_number: &OrderNumber,
    ) -> impl Future<Output = Result<Option<Order>, QueryError>> + Send;

    fn fetch_wallet(&self, user_id: i64) -> impl Future<Output = Result<Option<UserWallet>, QueryError>> + Send;

    /// Resolves a statement line's payer against the registry, trying the IBAN first, then the account number, then
    /// the national id.
    fn find_payer(&self, hints: &PayerHints) -> impl Future<Output = Result<Option<PayerMatch>, QueryError>> + Send;
}

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::OrderNumber,
    traits::data_objects::{CancelResult, ExpiryResult, SettleOutcome, SettlementFacts, StatementCredit},
};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No transaction exists with track id {0}")]
    TransactionNotFound(String),
    #[error("No crypto payment exists with id {0}")]
    CryptoPaymentNotFound(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("Order {0} has no wallet address to settle against")]
    MissingWalletAddress(OrderNumber),
    #[error("Transaction {track_id} references '{order_ref}', which is neither an order nor a wallet charge")]
    UnrecognizedOrderRef { track_id: String, order_ref: String },
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

/// The only code path that moves transactions, orders, crypto payments and wallets out of their pending state.
///
/// Every method runs in a single database transaction whose first write is a conditional update guarded on the
/// pending status (or a conflict-ignoring insert keyed on an external reference). When that first write touches
/// nothing, the whole unit is skipped and [`SettleOutcome::AlreadySettled`] is returned, so the same settlement fact
/// can be delivered any number of times, by any number of reconcilers, without being applied twice.
pub trait SettlementDatabase: Clone + Send + Sync {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Completes the pending transaction with the given `track_id`, then either completes its order or credits the
    /// wallet, depending on the transaction's `order_ref`.
    fn settle_transaction(
        &self,
        track_id: &str,
        facts: &SettlementFacts,
    ) -> impl Future<Output = Result<SettleOutcome, SettlementError>> + Send;

    /// Cancels the transaction and its order, if both are still pending. Returns `None` if the transaction had already
    /// left the pending state.
    fn cancel_transaction(
        &self,
        track_id: &str,
    ) -> impl Future<Output = Result<Option<CancelResult>, SettlementError>> + Send;

    /// Expires every pending crypto payment whose deadline is at or before `now`, and cancels the linked transactions
    /// and orders. Balances are not consulted.
    fn expire_crypto_payments(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ExpiryResult, SettlementError>> + Send;

    /// As [`Self::settle_transaction`], but additionally guarded on the crypto payment itself being pending.
    fn settle_crypto_payment(
        &self,
        payment_id: i64,
        facts: &SettlementFacts,
    ) -> impl Future<Output = Result<SettleOutcome, SettlementError>> + Send;

    /// Completes a pending crypto order that was paid at its `wallet_address`, without going through a crypto payment
    /// record. If the order has a pending transaction it is completed, otherwise a completed transaction keyed on
    /// `addr:<wallet address>` is recorded.
    fn settle_order_directly(
        &self,
        order_number: &OrderNumber,
        facts: &SettlementFacts,
    ) -> impl Future<Output = Result<SettleOutcome, SettlementError>> + Send;

    /// Records a completed statement transaction deduplicated on the bank serial and credits the user's wallet.
    fn record_statement_credit(
        &self,
        credit: &StatementCredit,
    ) -> impl Future<Output = Result<SettleOutcome, SettlementError>> + Send;
}

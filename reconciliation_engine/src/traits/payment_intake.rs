use std::future::Future;

use thiserror::Error;

use crate::db_types::{
    CryptoPayment,
    NewCryptoPayment,
    NewOrder,
    NewPayerAccount,
    NewTransaction,
    Order,
    PayerAccount,
    Transaction,
};

#[derive(Debug, Clone, Error)]
pub enum IntakeError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
}

impl From<sqlx::Error> for IntakeError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => IntakeError::AlreadyExists(db.to_string()),
            e => IntakeError::DatabaseError(e.to_string()),
        }
    }
}

/// Creation of the pending records that the reconcilers later settle.
///
/// In production these rows are written by the storefront's checkout flow. The trait exists so that the checkout
/// flow, fixtures and tests all share one insertion path.
pub trait PaymentIntake: Send + Sync {
    fn create_user(&self, display_name: &str) -> impl Future<Output = Result<i64, IntakeError>> + Send;

    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<Order, IntakeError>> + Send;

    fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> impl Future<Output = Result<Transaction, IntakeError>> + Send;

    fn insert_crypto_payment(
        &self,
        payment: NewCryptoPayment,
    ) -> impl Future<Output = Result<CryptoPayment, IntakeError>> + Send;

    fn register_payer(&self, payer: NewPayerAccount) -> impl Future<Output = Result<PayerAccount, IntakeError>> + Send;
}

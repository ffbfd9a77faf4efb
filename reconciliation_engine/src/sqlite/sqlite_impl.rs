//! `SqliteDatabase` is the SQLite backend for the reconciliation engine.
//!
//! It implements all the storage traits defined in the [`crate::traits`] module. Every settlement method opens a
//! database transaction, makes a conditional write its first statement, and commits only when that write took effect.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{
    crypto_payments,
    db_url,
    new_pool,
    orders,
    payers,
    sessions,
    transactions::{self, CompletedTransaction},
    users,
    wallets,
};
use crate::{
    db_types::{
        AuthSession,
        CryptoPayment,
        NewCryptoPayment,
        NewOrder,
        NewPayerAccount,
        NewTransaction,
        Order,
        OrderNumber,
        OrderRef,
        PayerAccount,
        PaymentType,
        Transaction,
        UserWallet,
    },
    helpers::PayerHints,
    traits::{
        CancelResult,
        ExpiryResult,
        IntakeError,
        PayerMatch,
        PaymentIntake,
        QueryError,
        ReconciliationQueries,
        SessionStore,
        SessionStoreError,
        SettleOutcome,
        SettlementDatabase,
        SettlementEffect,
        SettlementError,
        SettlementFacts,
        SettlementReceipt,
        StatementCredit,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `RECON_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }
}

/// Steps (b) and (c) of a settlement: having completed `transaction`, complete its order or credit the wallet.
async fn apply_to_order_or_wallet(
    transaction: &Transaction,
    facts: &SettlementFacts,
    conn: &mut SqliteConnection,
) -> Result<(SettlementEffect, Option<Order>), SettlementError> {
    let amount = facts.amount.unwrap_or(transaction.amount);
    match transaction.order_ref() {
        OrderRef::Order(order_number) => {
            if let Some(order) = orders::complete_if_pending(&order_number, facts.paid_at, &mut *conn).await? {
                debug!("🗃️ Order {order_number} completed by transaction [{}]", transaction.track_id);
                return Ok((SettlementEffect::OrderCompleted { order_number }, Some(order)));
            }
            let order = orders::fetch_order_by_number(&order_number, &mut *conn)
                .await?
                .ok_or_else(|| SettlementError::OrderNotFound(order_number.clone()))?;
            warn!(
                "🗃️ Transaction [{}] cleared for order {order_number}, which is already {}. Crediting {amount} to the \
                 wallet of user #{} instead.",
                transaction.track_id, order.status, transaction.user_id
            );
            let wallet = wallets::credit_wallet(transaction.user_id, amount, facts.paid_at, &mut *conn).await?;
            let effect = SettlementEffect::CreditedInsteadOfOrder { order_number, amount, balance: wallet.balance };
            Ok((effect, Some(order)))
        },
        OrderRef::WalletCharge(tag) => {
            let wallet = wallets::credit_wallet(transaction.user_id, amount, facts.paid_at, &mut *conn).await?;
            debug!("🗃️ Wallet charge {tag} credited {amount} to user #{}", transaction.user_id);
            Ok((SettlementEffect::WalletCredited { amount, balance: wallet.balance }, None))
        },
        OrderRef::Unrecognized(order_ref) => Err(SettlementError::UnrecognizedOrderRef {
            track_id: transaction.track_id.clone(),
            order_ref,
        }),
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn settle_transaction(
        &self,
        track_id: &str,
        facts: &SettlementFacts,
    ) -> Result<SettleOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::complete_if_pending(track_id, facts, &mut tx).await? else {
            if transactions::fetch_by_track_id(track_id, &mut tx).await?.is_none() {
                return Err(SettlementError::TransactionNotFound(track_id.to_string()));
            }
            debug!("🗃️ Transaction [{track_id}] is no longer pending. Nothing to settle.");
            return Ok(SettleOutcome::AlreadySettled);
        };
        let (effect, order) = apply_to_order_or_wallet(&transaction, facts, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Transaction [{track_id}] settled");
        Ok(SettleOutcome::Settled(SettlementReceipt { transaction, order, effect }))
    }

    async fn cancel_transaction(&self, track_id: &str) -> Result<Option<CancelResult>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(transaction) = transactions::cancel_if_pending(track_id, &mut tx).await? else {
            debug!("🗃️ Transaction [{track_id}] is not pending. Nothing to cancel.");
            return Ok(None);
        };
        let order = match transaction.order_ref() {
            OrderRef::Order(order_number) => orders::cancel_if_pending(&order_number, &mut tx).await?,
            _ => None,
        };
        tx.commit().await?;
        debug!("🗃️ Transaction [{track_id}] cancelled. Linked order cancelled: {}", order.is_some());
        Ok(Some(CancelResult { transaction, order }))
    }

    async fn expire_crypto_payments(&self, now: DateTime<Utc>) -> Result<ExpiryResult, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payments = crypto_payments::expire_overdue(now, &mut tx).await?;
        let mut result = ExpiryResult { payments, ..Default::default() };
        for payment in &result.payments {
            let Some(transaction) = transactions::cancel_by_id_if_pending(payment.transaction_id, &mut tx).await?
            else {
                continue;
            };
            if let OrderRef::Order(order_number) = transaction.order_ref() {
                if let Some(order) = orders::cancel_if_pending(&order_number, &mut tx).await? {
                    result.orders.push(order);
                }
            }
            result.transactions.push(transaction);
        }
        tx.commit().await?;
        if !result.is_empty() {
            debug!(
                "🗃️ Expired {} crypto payments, cancelling {} transactions and {} orders",
                result.payments.len(),
                result.transactions.len(),
                result.orders.len()
            );
        }
        Ok(result)
    }

    async fn settle_crypto_payment(
        &self,
        payment_id: i64,
        facts: &SettlementFacts,
    ) -> Result<SettleOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(payment) = crypto_payments::complete_if_pending(payment_id, &mut tx).await? else {
            if crypto_payments::fetch_crypto_payment(payment_id, &mut tx).await?.is_none() {
                return Err(SettlementError::CryptoPaymentNotFound(payment_id));
            }
            debug!("🗃️ Crypto payment #{payment_id} is no longer pending. Nothing to settle.");
            return Ok(SettleOutcome::AlreadySettled);
        };
        let Some(transaction) = transactions::complete_by_id_if_pending(payment.transaction_id, facts, &mut tx).await?
        else {
            warn!(
                "🗃️ Crypto payment #{payment_id} is pending but transaction #{} is not. Leaving both untouched.",
                payment.transaction_id
            );
            tx.rollback().await?;
            return Ok(SettleOutcome::AlreadySettled);
        };
        let (effect, order) = apply_to_order_or_wallet(&transaction, facts, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Crypto payment #{payment_id} at {} settled", payment.address);
        Ok(SettleOutcome::Settled(SettlementReceipt { transaction, order, effect }))
    }

    async fn settle_order_directly(
        &self,
        order_number: &OrderNumber,
        facts: &SettlementFacts,
    ) -> Result<SettleOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::complete_if_pending(order_number, facts.paid_at, &mut tx).await? else {
            if orders::fetch_order_by_number(order_number, &mut tx).await?.is_none() {
                return Err(SettlementError::OrderNotFound(order_number.clone()));
            }
            debug!("🗃️ Order {order_number} is no longer pending. Nothing to settle.");
            return Ok(SettleOutcome::AlreadySettled);
        };
        let Some(address) = order.wallet_address.as_deref() else {
            tx.rollback().await?;
            return Err(SettlementError::MissingWalletAddress(order_number.clone()));
        };
        // The funds at the address can only pay once. A crypto payment there that has already completed or expired
        // owns them.
        match crypto_payments::complete_for_address(address, &mut tx).await? {
            Some(payment) => trace!("🗃️ Crypto payment #{} completed alongside order {order_number}", payment.id),
            None => {
                if let Some(payment) = crypto_payments::fetch_for_address(address, &mut tx).await? {
                    debug!(
                        "🗃️ The crypto payment at {address} is already {}. Leaving order {order_number} untouched.",
                        payment.status
                    );
                    tx.rollback().await?;
                    return Ok(SettleOutcome::AlreadySettled);
                }
            },
        }
        let pending = transactions::fetch_pending_for_order_ref(order_number.as_str(), &mut tx).await?;
        let transaction = match pending {
            Some(pending) => transactions::complete_by_id_if_pending(pending.id, facts, &mut tx).await?,
            None => {
                let key = format!("addr:{address}");
                let record = CompletedTransaction {
                    track_id: &key,
                    order_ref: order_number.as_str(),
                    user_id: order.user_id,
                    amount: facts.amount.unwrap_or(order.amount),
                    payment_type: PaymentType::Crypto,
                    ref_number: facts.ref_number.as_deref(),
                    paid_at: facts.paid_at,
                    dedupe_key: &key,
                    description: Some("paid directly to the order wallet address"),
                };
                transactions::insert_completed_if_new(record, &mut tx).await?
            },
        };
        let Some(transaction) = transaction else {
            debug!("🗃️ A settlement for {address} has already been recorded. Leaving order {order_number} untouched.");
            tx.rollback().await?;
            return Ok(SettleOutcome::AlreadySettled);
        };
        tx.commit().await?;
        debug!("🗃️ Order {order_number} settled directly from {address}");
        let effect = SettlementEffect::OrderCompleted { order_number: order_number.clone() };
        Ok(SettleOutcome::Settled(SettlementReceipt { transaction, order: Some(order), effect }))
    }

    async fn record_statement_credit(&self, credit: &StatementCredit) -> Result<SettleOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let track_id = credit.track_id();
        let order_ref = OrderRef::wallet_charge_tag(credit.user_id, credit.paid_at);
        let record = CompletedTransaction {
            track_id: &track_id,
            order_ref: &order_ref,
            user_id: credit.user_id,
            amount: credit.amount,
            payment_type: PaymentType::Statement,
            ref_number: Some(credit.serial.as_str()),
            paid_at: credit.paid_at,
            dedupe_key: &credit.serial,
            description: Some(credit.description.as_str()),
        };
        let Some(transaction) = transactions::insert_completed_if_new(record, &mut tx).await? else {
            debug!("🗃️ Statement line {} has already been recorded", credit.serial);
            return Ok(SettleOutcome::AlreadySettled);
        };
        let wallet = wallets::credit_wallet(credit.user_id, credit.amount, credit.paid_at, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Statement line {} credited {} to user #{}", credit.serial, credit.amount, credit.user_id);
        let effect = SettlementEffect::WalletCredited { amount: credit.amount, balance: wallet.balance };
        Ok(SettleOutcome::Settled(SettlementReceipt { transaction, order: None, effect }))
    }
}

impl ReconciliationQueries for SqliteDatabase {
    async fn fetch_pending_gateway_transactions(&self, since: DateTime<Utc>) -> Result<Vec<Transaction>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_pending_by_type_since(PaymentType::Gateway, since, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_pending_crypto_payments(&self, now: DateTime<Utc>) -> Result<Vec<CryptoPayment>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = crypto_payments::fetch_pending_unexpired(now, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_pending_crypto_orders(&self, since: DateTime<Utc>) -> Result<Vec<Order>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_pending_crypto_orders(since, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_crypto_payment_for_address(&self, address: &str) -> Result<Option<CryptoPayment>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = crypto_payments::fetch_for_address(address, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transaction_by_track_id(&self, track_id: &str) -> Result<Option<Transaction>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_by_track_id(track_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_transaction_by_dedupe_key(&self, key: &str) -> Result<Option<Transaction>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fetch_by_dedupe_key(key, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::fetch_order_by_number(order_number, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_wallet(&self, user_id: i64) -> Result<Option<UserWallet>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = wallets::fetch_wallet(user_id, &mut conn).await?;
        Ok(result)
    }

    async fn find_payer(&self, hints: &PayerHints) -> Result<Option<PayerMatch>, QueryError> {
        let mut conn = self.pool.acquire().await?;
        let result = payers::find_payer(hints, &mut conn).await?;
        Ok(result)
    }
}

impl SessionStore for SqliteDatabase {
    async fn load_session(&self, channel: &str) -> Result<Option<AuthSession>, SessionStoreError> {
        let mut conn = self.pool.acquire().await?;
        let session = sessions::fetch_session(channel, &mut conn).await?;
        Ok(session)
    }

    async fn save_session(&self, session: &AuthSession) -> Result<(), SessionStoreError> {
        let mut conn = self.pool.acquire().await?;
        sessions::upsert_session(session, &mut conn).await?;
        trace!("🗃️ Session for {} saved", session.channel);
        Ok(())
    }

    async fn touch_session(&self, channel: &str, at: DateTime<Utc>) -> Result<(), SessionStoreError> {
        let mut conn = self.pool.acquire().await?;
        sessions::touch_session(channel, at, &mut conn).await?;
        Ok(())
    }

    async fn clear_session(&self, channel: &str) -> Result<(), SessionStoreError> {
        let mut conn = self.pool.acquire().await?;
        sessions::delete_session(channel, &mut conn).await?;
        trace!("🗃️ Session for {channel} cleared");
        Ok(())
    }
}

impl PaymentIntake for SqliteDatabase {
    async fn create_user(&self, display_name: &str) -> Result<i64, IntakeError> {
        let mut conn = self.pool.acquire().await?;
        let id = users::create_user(display_name, &mut conn).await?;
        Ok(id)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, IntakeError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        Ok(order)
    }

    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<Transaction, IntakeError> {
        let mut conn = self.pool.acquire().await?;
        let transaction = transactions::insert_transaction(transaction, &mut conn).await?;
        Ok(transaction)
    }

    async fn insert_crypto_payment(&self, payment: NewCryptoPayment) -> Result<CryptoPayment, IntakeError> {
        let mut conn = self.pool.acquire().await?;
        let payment = crypto_payments::insert_crypto_payment(payment, &mut conn).await?;
        Ok(payment)
    }

    async fn register_payer(&self, payer: NewPayerAccount) -> Result<PayerAccount, IntakeError> {
        let mut conn = self.pool.acquire().await?;
        let account = payers::register_payer(payer, &mut conn).await?;
        Ok(account)
    }
}

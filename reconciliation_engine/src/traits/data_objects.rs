use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{CryptoPayment, Order, OrderNumber, Rial, Transaction};

/// What a reconciler observed at the source of truth when it decided that a payment has cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFacts {
    /// The amount confirmed by the channel. `None` settles for the amount recorded on the transaction.
    pub amount: Option<Rial>,
    pub ref_number: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl SettlementFacts {
    pub fn new(paid_at: DateTime<Utc>) -> Self {
        Self { amount: None, ref_number: None, paid_at }
    }

    pub fn with_amount(mut self, amount: Rial) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_ref_number<S: Into<String>>(mut self, ref_number: S) -> Self {
        self.ref_number = Some(ref_number.into());
        self
    }
}

/// The result of a settlement attempt. `AlreadySettled` is the normal outcome when a second channel, or a second
/// cycle of the same channel, observes a payment that has already been applied.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    Settled(SettlementReceipt),
    AlreadySettled,
}

impl SettleOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettleOutcome::Settled(_))
    }

    pub fn receipt(&self) -> Option<&SettlementReceipt> {
        match self {
            SettleOutcome::Settled(r) => Some(r),
            SettleOutcome::AlreadySettled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub transaction: Transaction,
    pub order: Option<Order>,
    pub effect: SettlementEffect,
}

impl SettlementReceipt {
    pub fn user_id(&self) -> i64 {
        self.transaction.user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEffect {
    /// The linked order moved from pending to completed.
    OrderCompleted { order_number: OrderNumber },
    /// A wallet top-up was credited.
    WalletCredited { amount: Rial, balance: Rial },
    /// The payment cleared for an order that was no longer pending. The funds went to the payer's wallet instead.
    CreditedInsteadOfOrder { order_number: OrderNumber, amount: Rial, balance: Rial },
}

/// A credit line from the bank statement that has been matched to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementCredit {
    pub user_id: i64,
    /// The bank serial of the statement line. Used as the dedupe key.
    pub serial: String,
    pub amount: Rial,
    pub paid_at: DateTime<Utc>,
    pub description: String,
}

impl StatementCredit {
    pub fn track_id(&self) -> String {
        format!("ST-{}", self.serial)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResult {
    pub transaction: Transaction,
    pub order: Option<Order>,
}

/// Everything the expiry sweep touched.
#[derive(Debug, Clone, Default)]
pub struct ExpiryResult {
    pub payments: Vec<CryptoPayment>,
    pub transactions: Vec<Transaction>,
    pub orders: Vec<Order>,
}

impl ExpiryResult {
    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    pub fn count(&self) -> usize {
        self.payments.len()
    }

    /// Distinct users whose cached views are stale after the sweep.
    pub fn affected_users(&self) -> Vec<i64> {
        let mut users = self.transactions.iter().map(|t| t.user_id).collect::<Vec<i64>>();
        users.sort_unstable();
        users.dedup();
        users
    }
}

/// Which registered identifier matched a statement line to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayerKey {
    Iban,
    AccountNumber,
    NationalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayerMatch {
    pub user_id: i64,
    pub matched_by: PayerKey,
}

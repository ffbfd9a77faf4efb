use serde::{Deserialize, Serialize};

use crate::{
    db_types::{PaymentType, Rial},
    traits::{SettlementEffect, SettlementReceipt},
};

/// Published after a settlement has been committed. Drives user-facing notifications.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementEvent {
    pub user_id: i64,
    pub track_id: String,
    pub channel: PaymentType,
    pub amount: Rial,
    pub effect: SettlementEffect,
}

impl SettlementEvent {
    pub fn new(receipt: &SettlementReceipt) -> Self {
        Self {
            user_id: receipt.user_id(),
            track_id: receipt.transaction.track_id.clone(),
            channel: receipt.transaction.payment_type,
            amount: receipt.transaction.amount,
            effect: receipt.effect.clone(),
        }
    }

    /// A short machine-readable name for the event, e.g. for a webhook `event` field.
    pub fn event_name(&self) -> &'static str {
        match self.effect {
            SettlementEffect::OrderCompleted { .. } => "order_paid",
            SettlementEffect::WalletCredited { .. } => "wallet_charged",
            SettlementEffect::CreditedInsteadOfOrder { .. } => "order_payment_credited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserChangeReason {
    Settled,
    Cancelled,
    Expired,
}

/// Published after any committed change to a user's wallet or orders, so that cached views can be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChangedEvent {
    pub user_id: i64,
    pub reason: UserChangeReason,
}

impl UserChangedEvent {
    pub fn new(user_id: i64, reason: UserChangeReason) -> Self {
        Self { user_id, reason }
    }
}

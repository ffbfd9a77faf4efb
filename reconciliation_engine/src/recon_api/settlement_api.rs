use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::OrderNumber,
    events::{EventProducers, SettlementEvent, UserChangeReason, UserChangedEvent},
    traits::{
        CancelResult,
        ExpiryResult,
        SettleOutcome,
        SettlementDatabase,
        SettlementError,
        SettlementFacts,
        SettlementReceipt,
        StatementCredit,
    },
};

/// `SettlementApi` is what the reconcilers call to apply a decision. It delegates the state change to the
/// [`SettlementDatabase`] backend, and once the change has been committed, publishes the settlement and cache
/// invalidation events. Nothing is published for an [`SettleOutcome::AlreadySettled`] result.
#[derive(Clone)]
pub struct SettlementApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B> SettlementApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    async fn notify_settled(&self, outcome: &SettleOutcome) {
        let Some(receipt) = outcome.receipt() else {
            return;
        };
        self.publish_settlement(receipt).await;
        self.publish_user_changed(receipt.user_id(), UserChangeReason::Settled).await;
    }

    async fn publish_settlement(&self, receipt: &SettlementReceipt) {
        for emitter in &self.producers.settlement_producer {
            trace!("📬️ Notifying settlement hook subscribers of [{}]", receipt.transaction.track_id);
            emitter.publish_event(SettlementEvent::new(receipt)).await;
        }
    }

    async fn publish_user_changed(&self, user_id: i64, reason: UserChangeReason) {
        for emitter in &self.producers.user_changed_producer {
            emitter.publish_event(UserChangedEvent::new(user_id, reason)).await;
        }
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase
{
    /// Settles a pending transaction identified by its gateway track id.
    pub async fn settle_transaction(
        &self,
        track_id: &str,
        facts: &SettlementFacts,
    ) -> Result<SettleOutcome, SettlementError> {
        let outcome = self.db.settle_transaction(track_id, facts).await?;
        self.notify_settled(&outcome).await;
        Ok(outcome)
    }

    pub async fn cancel_transaction(&self, track_id: &str) -> Result<Option<CancelResult>, SettlementError> {
        let result = self.db.cancel_transaction(track_id).await?;
        if let Some(cancelled) = &result {
            info!("❌️ Transaction [{track_id}] cancelled");
            self.publish_user_changed(cancelled.transaction.user_id, UserChangeReason::Cancelled).await;
        }
        Ok(result)
    }

    pub async fn expire_crypto_payments(&self, now: DateTime<Utc>) -> Result<ExpiryResult, SettlementError> {
        let result = self.db.expire_crypto_payments(now).await?;
        for user_id in result.affected_users() {
            self.publish_user_changed(user_id, UserChangeReason::Expired).await;
        }
        Ok(result)
    }

    pub async fn settle_crypto_payment(
        &self,
        payment_id: i64,
        facts: &SettlementFacts,
    ) -> Result<SettleOutcome, SettlementError> {
        let outcome = self.db.settle_crypto_payment(payment_id, facts).await?;
        self.notify_settled(&outcome).await;
        Ok(outcome)
    }

    pub async fn settle_order_directly(
        &self,
        order_number: &OrderNumber,
        facts: &SettlementFacts,
    ) -> Result<SettleOutcome, SettlementError> {
        let outcome = self.db.settle_order_directly(order_number, facts).await?;
        self.notify_settled(&outcome).await;
        Ok(outcome)
    }

    pub async fn record_statement_credit(&self, credit: &StatementCredit) -> Result<SettleOutcome, SettlementError> {
        let outcome = self.db.record_statement_credit(credit).await?;
        self.notify_settled(&outcome).await;
        Ok(outcome)
    }
}

use std::time::Duration;

use channel_tools::{LedgerNode, PriceFeed};
use chrono::{DateTime, Utc};
use log::*;
use pay_common::Rial;
use reconciliation_engine::{
    db_types::{CryptoPayment, CryptoPaymentStatus, Order},
    tolerance::{asset_amount_for, within_tolerance},
    ReconciliationQueries,
    SettlementApi,
    SettlementDatabase,
    SettlementFacts,
};
use tokio::task::JoinSet;

use crate::{
    config::LedgerReconcilerConfig,
    errors::ReconcilerError,
    reconcilers::{Reconciler, RunSummary},
};

enum LedgerOutcome {
    Settled,
    Skipped,
}

/// Watches the per-order receiving wallets on the ledger.
///
/// Each run does three things, in this order:
/// 1. Expires crypto payments whose window has closed, cancelling their transactions and orders.
/// 2. Checks the balance of every live crypto payment address and settles the ones that hold enough funds.
/// 3. Falls back to the orders themselves: pending crypto orders that carry a wallet address no payment record has
///    claimed are priced in the fallback asset and settled directly when the balance covers them.
///
/// Settled wallets are swept to the custodial address in the background. A failed sweep is logged and never undoes the
/// settlement.
pub struct LedgerReconciler<B, L, F> {
    api: SettlementApi<B>,
    ledger: L,
    price_feed: F,
    config: LedgerReconcilerConfig,
    sweeps: JoinSet<()>,
}

impl<B, L, F> LedgerReconciler<B, L, F>
where
    B: SettlementDatabase + ReconciliationQueries + 'static,
    L: LedgerNode + Clone + 'static,
    F: PriceFeed + 'static,
{
    pub fn new(api: SettlementApi<B>, ledger: L, price_feed: F, config: LedgerReconcilerConfig) -> Self {
        Self { api, ledger, price_feed, config, sweeps: JoinSet::new() }
    }

    /// Waits for every sweep spawned so far to finish.
    pub async fn finish_sweeps(&mut self) {
        while let Some(result) = self.sweeps.join_next().await {
            if let Err(e) = result {
                error!("⛓️ A sweep task panicked. {e}");
            }
        }
    }

    fn spawn_sweep(&mut self, address: &str, private_key: &str) {
        if self.config.custodial_address.is_empty() {
            debug!("⛓️ No custodial address configured. {address} will not be swept.");
            return;
        }
        let ledger = self.ledger.clone();
        let key = private_key.to_string();
        let destination = self.config.custodial_address.clone();
        let address = address.to_string();
        self.sweeps.spawn(async move {
            match ledger.sweep(&key, &destination).await {
                Ok(txid) => info!("⛓️ Swept {address} to the custodial wallet in {txid}"),
                Err(e) => error!("⛓️ Could not sweep {address}. The funds remain in the order wallet. {e}"),
            }
        });
    }

    async fn reconcile_payment(
        &mut self,
        payment: &CryptoPayment,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, ReconcilerError> {
        let balance = self.ledger.get_balance(&payment.address).await?;
        if !within_tolerance(payment.expected_amount, balance) {
            trace!(
                "⛓️ {} holds {balance} {}, waiting for {}",
                payment.address,
                payment.asset,
                payment.expected_amount
            );
            return Ok(LedgerOutcome::Skipped);
        }
        let facts = SettlementFacts::new(now).with_ref_number(payment.address.clone());
        let outcome = self.api.settle_crypto_payment(payment.id, &facts).await?;
        if !outcome.is_settled() {
            return Ok(LedgerOutcome::Skipped);
        }
        info!("⛓️ Crypto payment #{} settled. {} received {balance} {}", payment.id, payment.address, payment.asset);
        self.spawn_sweep(&payment.address, &payment.private_key);
        Ok(LedgerOutcome::Settled)
    }

    /// True when a crypto payment record decides what happens to the funds at `address`, so the order must not be
    /// settled from them directly. That is the case when the payment there has completed or expired, or when it is
    /// pending behind a pending transaction for this order and the payment scan will handle it.
    async fn address_is_claimed(&self, order: &Order, address: &str) -> Result<bool, ReconcilerError> {
        let db = self.api.db();
        let Some(payment) = db.fetch_crypto_payment_for_address(address).await? else {
            return Ok(false);
        };
        if payment.status != CryptoPaymentStatus::Pending {
            trace!("⛓️ {address} belongs to crypto payment #{}, which is {}", payment.id, payment.status);
            return Ok(true);
        }
        let consistent = db
            .fetch_transaction(payment.transaction_id)
            .await?
            .map(|tx| tx.is_pending() && tx.order_ref == order.order_number.as_str())
            .unwrap_or(false);
        Ok(consistent)
    }

    async fn reconcile_order(
        &mut self,
        order: &Order,
        address: &str,
        price: Rial,
        now: DateTime<Utc>,
    ) -> Result<LedgerOutcome, ReconcilerError> {
        let expected = asset_amount_for(order.amount, price).ok_or(ReconcilerError::InvalidPrice)?;
        let balance = self.ledger.get_balance(address).await?;
        if balance.is_zero() || !within_tolerance(expected, balance) {
            trace!("⛓️ Order {} wallet {address} holds {balance}, waiting for {expected}", order.order_number);
            return Ok(LedgerOutcome::Skipped);
        }
        let facts = SettlementFacts::new(now).with_ref_number(address);
        let outcome = self.api.settle_order_directly(&order.order_number, &facts).await?;
        if !outcome.is_settled() {
            return Ok(LedgerOutcome::Skipped);
        }
        info!("⛓️ Order {} settled from the balance of {address}", order.order_number);
        // Only wallets we hold the key for can be swept.
        match self.api.db().fetch_crypto_payment_for_address(address).await? {
            Some(payment) => self.spawn_sweep(address, &payment.private_key),
            None => warn!("⛓️ No key is on record for {address}. Its funds must be swept by hand."),
        }
        Ok(LedgerOutcome::Settled)
    }

    async fn fallback_scan(&mut self, now: DateTime<Utc>, summary: &mut RunSummary) -> Result<(), ReconcilerError> {
        let since = now - self.config.order_fallback_age;
        let orders = self.api.db().fetch_pending_crypto_orders(since).await?;
        let mut candidates = Vec::with_capacity(orders.len());
        for order in orders {
            let Some(address) = order.wallet_address.clone() else { continue };
            if self.address_is_claimed(&order, &address).await? {
                continue;
            }
            candidates.push((order, address));
        }
        if candidates.is_empty() {
            return Ok(());
        }
        debug!("⛓️ {} crypto orders without a usable payment record to check", candidates.len());
        let asset = self.config.fallback_asset.clone();
        let price = match self.price_feed.price(&asset).await {
            Ok(price) => price,
            Err(e) => {
                error!("⛓️ No {asset} price is available, so {} orders cannot be checked. {e}", candidates.len());
                summary.errored += candidates.len();
                return Ok(());
            },
        };
        for (order, address) in &candidates {
            match self.reconcile_order(order, address, price, now).await {
                Ok(LedgerOutcome::Settled) => summary.processed += 1,
                Ok(LedgerOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!("⛓️ Could not reconcile crypto order {}. {e}", order.order_number);
                    summary.errored += 1;
                },
            }
        }
        Ok(())
    }
}

impl<B, L, F> Reconciler for LedgerReconciler<B, L, F>
where
    B: SettlementDatabase + ReconciliationQueries + 'static,
    L: LedgerNode + Clone + 'static,
    F: PriceFeed + 'static,
{
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn run_once(&mut self) -> Result<RunSummary, ReconcilerError> {
        // reap sweeps left over from earlier runs
        while let Some(result) = self.sweeps.try_join_next() {
            if let Err(e) = result {
                error!("⛓️ A sweep task panicked. {e}");
            }
        }
        let now = Utc::now();
        let mut summary = RunSummary::default();
        let expired = self.api.expire_crypto_payments(now).await?;
        if !expired.is_empty() {
            info!("⛓️ {} crypto payments expired unpaid", expired.count());
        }
        summary.cancelled += expired.count();

        let payments = self.api.db().fetch_pending_crypto_payments(now).await?;
        debug!("⛓️ {} live crypto payments to check", payments.len());
        for payment in &payments {
            match self.reconcile_payment(payment, now).await {
                Ok(LedgerOutcome::Settled) => summary.processed += 1,
                Ok(LedgerOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!("⛓️ Could not reconcile crypto payment #{} at {}. {e}", payment.id, payment.address);
                    summary.errored += 1;
                },
            }
        }

        self.fallback_scan(now, &mut summary).await?;
        info!("⛓️ Ledger run complete. {summary}");
        Ok(summary)
    }

    async fn finish(&mut self) {
        if !self.sweeps.is_empty() {
            info!("⛓️ Waiting for {} sweeps to complete", self.sweeps.len());
        }
        self.finish_sweeps().await;
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration as ChronoDuration;
    use pay_common::MicroUnits;
    use reconciliation_engine::{
        db_types::{CryptoPaymentStatus, OrderNumber, OrderStatusType, TransactionStatus},
        events::EventProducers,
        test_utils::prepare_env::{fresh_database, tear_down},
    };

    use super::*;
    use crate::test::{
        fixtures::{bare_crypto_order, crypto_order, crypto_wallet_charge, new_user},
        mocks::{FakeLedger, FakePriceFeed},
    };

    fn units(s: &str) -> MicroUnits {
        s.parse().unwrap()
    }

    fn reconciler<B>(db: B, ledger: FakeLedger, feed: FakePriceFeed) -> LedgerReconciler<B, FakeLedger, FakePriceFeed>
    where B: SettlementDatabase + ReconciliationQueries + 'static {
        let config = LedgerReconcilerConfig {
            enabled: true,
            interval: Duration::from_secs(1),
            custodial_address: "UQ-custody".into(),
            order_fallback_age: ChronoDuration::hours(24),
            fallback_asset: "TON".into(),
            api: channel_tools::LedgerConfig::new("http://localhost", "key"),
            price_feed: channel_tools::PriceFeedConfig::new("http://localhost"),
        };
        LedgerReconciler::new(SettlementApi::new(db, EventProducers::default()), ledger, feed, config)
    }

    #[tokio::test]
    async fn balance_within_tolerance_settles_and_sweeps() {
        let db = fresh_database().await;
        let user = new_user(&db, "alice").await;
        let later = Utc::now() + ChronoDuration::minutes(30);
        crypto_order(&db, user, "OC100001", 6_000_000, "UQ-A", units("120"), later).await;
        crypto_order(&db, user, "OC100002", 6_000_000, "UQ-B", units("120"), later).await;
        let ledger = FakeLedger::new();
        ledger.set_balance("UQ-A", units("119.5"));
        ledger.set_balance("UQ-B", units("100"));
        let mut recon = reconciler(db.clone(), ledger.clone(), FakePriceFeed::default());

        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary, RunSummary { processed: 1, skipped: 1, ..Default::default() });
        let paid = db.fetch_crypto_payment_for_address("UQ-A").await.unwrap().unwrap();
        assert_eq!(paid.status, CryptoPaymentStatus::Completed);
        let order = db.fetch_order_by_number(&OrderNumber::from("OC100001")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Completed);
        let short = db.fetch_crypto_payment_for_address("UQ-B").await.unwrap().unwrap();
        assert_eq!(short.status, CryptoPaymentStatus::Pending);
        assert_eq!(ledger.sweeps(), vec![("pk-UQ-A".to_string(), "UQ-custody".to_string())]);

        // a second run settles nothing new and sweeps nothing new
        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary.processed, 0);
        assert_eq!(ledger.sweeps().len(), 1);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn failed_sweep_keeps_the_settlement() {
        let db = fresh_database().await;
        let user = new_user(&db, "bob").await;
        crypto_order(&db, user, "OC200001", 1_000_000, "UQ-S", units("10"), Utc::now() + ChronoDuration::hours(1))
            .await;
        let ledger = FakeLedger::new();
        ledger.set_balance("UQ-S", units("10"));
        ledger.reject_sweeps();
        let mut recon = reconciler(db.clone(), ledger.clone(), FakePriceFeed::default());

        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary.processed, 1);
        assert_eq!(ledger.sweeps().len(), 1);
        let tx = db.fetch_transaction_by_track_id("CR-UQ-S").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn overdue_payments_expire_and_cancel_their_orders() {
        let db = fresh_database().await;
        let user = new_user(&db, "carol").await;
        crypto_order(&db, user, "OC300001", 1_000_000, "UQ-E", units("10"), Utc::now() - ChronoDuration::minutes(1))
            .await;
        let ledger = FakeLedger::new();
        // funds that arrive after the deadline do not revive the payment
        ledger.set_balance("UQ-E", units("10"));
        let mut recon = reconciler(db.clone(), ledger.clone(), FakePriceFeed::default());

        let summary = recon.run_once().await.unwrap();
        assert_eq!(summary, RunSummary { cancelled: 1, ..Default::default() });
        let payment = db.fetch_crypto_payment_for_address("UQ-E").await.unwrap().unwrap();
        assert_eq!(payment.status, CryptoPaymentStatus::Expired);
        let order = db.fetch_order_by_number(&OrderNumber::from("OC300001")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Cancelled);
        let tx = db.fetch_transaction_by_track_id("CR-UQ-E").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
        assert!(ledger.sweeps().is_empty());
        tear_down(db).await;
    }

    #[tokio::test]
    async fn orders_without_payment_record_are_priced_and_settled() {
        let db = fresh_database().await;
        let user = new_user(&db, "dave").await;
        // 5,000,000 Rial at 50,000 Rial per unit is 100 units
        bare_crypto_order(&db, user, "OC400001", 5_000_000, "UQ-F1").await;
        bare_crypto_order(&db, user, "OC400002", 5_000_000, "UQ-F2").await;
        let ledger = FakeLedger::new();
        ledger.set_balance("UQ-F1", units("96"));
        ledger.set_balance("UQ-F2", units("90"));
        let feed = FakePriceFeed::with_price(Rial::from(50_000));
        let mut recon = reconciler(db.clone(), ledger.clone(), feed.clone());

        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary, RunSummary { processed: 1, skipped: 1, ..Default::default() });
        assert_eq!(feed.calls(), 1);
        let paid = db.fetch_order_by_number(&OrderNumber::from("OC400001")).await.unwrap().unwrap();
        assert_eq!(paid.status, OrderStatusType::Completed);
        let tx = db.fetch_transaction_by_track_id("addr:UQ-F1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.amount, Rial::from(5_000_000));
        let waiting = db.fetch_order_by_number(&OrderNumber::from("OC400002")).await.unwrap().unwrap();
        assert_eq!(waiting.status, OrderStatusType::Pending);
        // no key on record for these wallets
        assert!(ledger.sweeps().is_empty());
        tear_down(db).await;
    }

    #[tokio::test]
    async fn fallback_leaves_consistent_payments_to_the_payment_scan() {
        let db = fresh_database().await;
        let user = new_user(&db, "erin").await;
        crypto_order(&db, user, "OC500001", 5_000_000, "UQ-G", units("120"), Utc::now() + ChronoDuration::hours(1))
            .await;
        let ledger = FakeLedger::new();
        let feed = FakePriceFeed::with_price(Rial::from(50_000));
        let mut recon = reconciler(db.clone(), ledger, feed.clone());

        let summary = recon.run_once().await.unwrap();
        assert_eq!(summary, RunSummary { skipped: 1, ..Default::default() });
        assert_eq!(feed.calls(), 0);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn missing_price_counts_fallback_orders_as_errors() {
        let db = fresh_database().await;
        let user = new_user(&db, "frank").await;
        bare_crypto_order(&db, user, "OC600001", 5_000_000, "UQ-H").await;
        let ledger = FakeLedger::new();
        ledger.set_balance("UQ-H", units("100"));
        let mut recon = reconciler(db.clone(), ledger, FakePriceFeed::default());

        let summary = recon.run_once().await.unwrap();
        assert_eq!(summary, RunSummary { errored: 1, ..Default::default() });
        let order = db.fetch_order_by_number(&OrderNumber::from("OC600001")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Pending);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn deposit_claimed_by_a_wallet_charge_does_not_also_pay_an_order() {
        let db = fresh_database().await;
        let user = new_user(&db, "gina").await;
        let later = Utc::now() + ChronoDuration::hours(1);
        crypto_wallet_charge(&db, user, 5_000_000, "UQ-X", units("100"), later).await;
        bare_crypto_order(&db, user, "OC700001", 5_000_000, "UQ-X").await;
        let ledger = FakeLedger::new();
        ledger.set_balance("UQ-X", units("100"));
        let feed = FakePriceFeed::with_price(Rial::from(50_000));
        let mut recon = reconciler(db.clone(), ledger.clone(), feed);

        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary, RunSummary { processed: 1, ..Default::default() });
        let wallet = db.fetch_wallet(user).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Rial::from(5_000_000));
        let order = db.fetch_order_by_number(&OrderNumber::from("OC700001")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Pending);
        assert!(db.fetch_transaction_by_track_id("addr:UQ-X").await.unwrap().is_none());
        assert_eq!(ledger.sweeps(), vec![("pk-UQ-X".to_string(), "UQ-custody".to_string())]);

        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary, RunSummary::default());
        assert_eq!(ledger.sweeps().len(), 1);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn funds_arriving_after_expiry_do_not_pay_an_order_at_the_same_address() {
        let db = fresh_database().await;
        let user = new_user(&db, "hadi").await;
        let deadline = Utc::now() - ChronoDuration::minutes(1);
        crypto_wallet_charge(&db, user, 5_000_000, "UQ-Y", units("100"), deadline).await;
        bare_crypto_order(&db, user, "OC800001", 5_000_000, "UQ-Y").await;
        let ledger = FakeLedger::new();
        ledger.set_balance("UQ-Y", units("100"));
        let feed = FakePriceFeed::with_price(Rial::from(50_000));
        let mut recon = reconciler(db.clone(), ledger.clone(), feed.clone());

        let summary = recon.run_once().await.unwrap();
        recon.finish_sweeps().await;
        assert_eq!(summary, RunSummary { cancelled: 1, ..Default::default() });
        let payment = db.fetch_crypto_payment_for_address("UQ-Y").await.unwrap().unwrap();
        assert_eq!(payment.status, CryptoPaymentStatus::Expired);
        let order = db.fetch_order_by_number(&OrderNumber::from("OC800001")).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Pending);
        assert_eq!(feed.calls(), 0);
        assert!(ledger.sweeps().is_empty());
        assert!(db.fetch_wallet(user).await.unwrap().is_none());
        tear_down(db).await;
    }
}

use std::time::Duration;

use channel_tools::{PaymentGateway, VerifyResult};
use chrono::Utc;
use log::*;
use reconciliation_engine::{
    db_types::Transaction,
    ReconciliationQueries,
    SettlementApi,
    SettlementDatabase,
    SettlementFacts,
};

use crate::{
    config::GatewayReconcilerConfig,
    errors::ReconcilerError,
    reconcilers::{Reconciler, RunSummary},
};

enum GatewayOutcome {
    Settled,
    Cancelled,
    AlreadySettled,
    StillPending,
}

/// Polls the payment gateway for every recent pending gateway transaction. A successful verify settles the
/// transaction; a failed verify is followed by an inquiry, which may report that the payer cancelled.
pub struct GatewayReconciler<B, G> {
    api: SettlementApi<B>,
    gateway: G,
    config: GatewayReconcilerConfig,
}

impl<B, G> GatewayReconciler<B, G>
where
    B: SettlementDatabase + ReconciliationQueries + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(api: SettlementApi<B>, gateway: G, config: GatewayReconcilerConfig) -> Self {
        Self { api, gateway, config }
    }

    async fn reconcile(&self, transaction: &Transaction) -> Result<GatewayOutcome, ReconcilerError> {
        let track_id = transaction.track_id.as_str();
        match self.gateway.verify(track_id).await? {
            VerifyResult::Verified(payment) => {
                if payment.amount != transaction.amount {
                    warn!(
                        "💳️ Gateway verified {} for [{track_id}], but the transaction was opened for {}. Settling for \
                         the verified amount.",
                        payment.amount, transaction.amount
                    );
                }
                let facts = SettlementFacts::new(payment.paid_at)
                    .with_amount(payment.amount)
                    .with_ref_number(payment.ref_number);
                let outcome = self.api.settle_transaction(track_id, &facts).await?;
                if outcome.is_settled() {
                    info!("💳️ Payment [{track_id}] verified and settled");
                    Ok(GatewayOutcome::Settled)
                } else {
                    debug!("💳️ Payment [{track_id}] was already settled");
                    Ok(GatewayOutcome::AlreadySettled)
                }
            },
            VerifyResult::Failed { code, message } => {
                debug!("💳️ Verify for [{track_id}] returned {code}: {message}. Checking payment status.");
                let inquiry = self.gateway.inquiry(track_id).await?;
                if !inquiry.is_cancelled() {
                    trace!("💳️ [{track_id}] is still open at the gateway (status {})", inquiry.status);
                    return Ok(GatewayOutcome::StillPending);
                }
                match self.api.cancel_transaction(track_id).await? {
                    Some(_) => Ok(GatewayOutcome::Cancelled),
                    None => Ok(GatewayOutcome::AlreadySettled),
                }
            },
        }
    }
}

impl<B, G> Reconciler for GatewayReconciler<B, G>
where
    B: SettlementDatabase + ReconciliationQueries + 'static,
    G: PaymentGateway + 'static,
{
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn run_once(&mut self) -> Result<RunSummary, ReconcilerError> {
        let since = Utc::now() - self.config.window;
        let pending = self.api.db().fetch_pending_gateway_transactions(since).await?;
        debug!("💳️ {} pending gateway transactions to check", pending.len());
        let mut summary = RunSummary::default();
        for transaction in &pending {
            match self.reconcile(transaction).await {
                Ok(GatewayOutcome::Settled) => summary.processed += 1,
                Ok(GatewayOutcome::Cancelled) => summary.cancelled += 1,
                Ok(GatewayOutcome::AlreadySettled | GatewayOutcome::StillPending) => summary.skipped += 1,
                Err(e) => {
                    error!("💳️ Could not reconcile gateway payment [{}]. {e}", transaction.track_id);
                    summary.errored += 1;
                },
            }
        }
        info!("💳️ Gateway run complete. {summary}");
        Ok(summary)
    }
}

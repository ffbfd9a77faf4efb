use std::time::Duration;

use channel_tools::{BankPortal, StatementLine};
use chrono::Utc;
use log::*;
use reconciliation_engine::{
    helpers::extract_payer,
    traits::StatementCredit,
    ReconciliationQueries,
    SessionStore,
    SettlementApi,
    SettlementDatabase,
};

use crate::{
    config::StatementReconcilerConfig,
    errors::ReconcilerError,
    reconcilers::{Reconciler, RunSummary},
    session::{to_portal_session, SessionManager},
};

enum LineOutcome {
    Credited,
    Duplicate,
    Unmatched,
}

/// Reads the merchant's bank statement and credits the wallet of every registered payer that transferred money in.
///
/// The statement line serial is the idempotency key, so overlapping windows and repeated runs never credit a line
/// twice. Lines whose sender cannot be identified are logged and left for manual handling.
pub struct StatementReconciler<B, P> {
    api: SettlementApi<B>,
    sessions: SessionManager<P, B>,
    config: StatementReconcilerConfig,
}

impl<B, P> StatementReconciler<B, P>
where
    B: SettlementDatabase + ReconciliationQueries + SessionStore + 'static,
    P: BankPortal + 'static,
{
    pub fn new(api: SettlementApi<B>, sessions: SessionManager<P, B>, config: StatementReconcilerConfig) -> Self {
        Self { api, sessions, config }
    }

    pub fn sessions(&self) -> &SessionManager<P, B> {
        &self.sessions
    }

    /// Fetches the statement window ending now. A session the portal rejects is replaced once, and the request
    /// repeated. A second rejection abandons the run.
    async fn fetch_statement(&mut self) -> Result<Vec<StatementLine>, ReconcilerError> {
        let to = Utc::now();
        let from = to - self.config.window;
        let account = self.config.portal.account.as_str();
        let session = to_portal_session(&self.sessions.ensure_valid().await?);
        let lines = match self.sessions.portal().statement(account, from, to, &session).await {
            Ok(lines) => lines,
            Err(e) if e.is_auth_failure() => {
                warn!("🏦️ The portal did not accept the session. {e}");
                let session = to_portal_session(&self.sessions.force_login().await?);
                self.sessions.portal().statement(account, from, to, &session).await?
            },
            Err(e) => return Err(e.into()),
        };
        self.sessions.record_activity().await;
        Ok(lines)
    }

    async fn reconcile_line(&self, line: &StatementLine) -> Result<LineOutcome, ReconcilerError> {
        let db = self.api.db();
        if db.fetch_transaction_by_dedupe_key(&line.serial).await?.is_some() {
            trace!("🏦️ Statement line {} has already been recorded", line.serial);
            return Ok(LineOutcome::Duplicate);
        }
        let hints = extract_payer(&line.description);
        if !hints.is_identifiable() {
            warn!(
                "🏦️ Could not identify the sender of statement line {} ({}): '{}'",
                line.serial, line.amount, line.description
            );
            return Ok(LineOutcome::Unmatched);
        }
        let Some(payer) = db.find_payer(&hints).await? else {
            warn!(
                "🏦️ Statement line {} ({}) is from an unregistered payer. Hints: {hints:?}",
                line.serial, line.amount
            );
            return Ok(LineOutcome::Unmatched);
        };
        debug!("🏦️ Statement line {} matched user #{} by {:?}", line.serial, payer.user_id, payer.matched_by);
        let credit = StatementCredit {
            user_id: payer.user_id,
            serial: line.serial.clone(),
            amount: line.amount,
            paid_at: line.timestamp,
            description: line.description.clone(),
        };
        let outcome = self.api.record_statement_credit(&credit).await?;
        if outcome.is_settled() {
            info!("🏦️ Credited {} to user #{} from statement line {}", line.amount, payer.user_id, line.serial);
            Ok(LineOutcome::Credited)
        } else {
            Ok(LineOutcome::Duplicate)
        }
    }
}

impl<B, P> Reconciler for StatementReconciler<B, P>
where
    B: SettlementDatabase + ReconciliationQueries + SessionStore + 'static,
    P: BankPortal + 'static,
{
    fn name(&self) -> &'static str {
        "statement"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn run_once(&mut self) -> Result<RunSummary, ReconcilerError> {
        let lines = self.fetch_statement().await?;
        let credits = lines.iter().filter(|l| l.is_credit()).collect::<Vec<_>>();
        debug!("🏦️ Statement has {} lines, {} of them credits", lines.len(), credits.len());
        let mut summary = RunSummary::default();
        for line in credits {
            match self.reconcile_line(line).await {
                Ok(LineOutcome::Credited) => summary.processed += 1,
                Ok(LineOutcome::Duplicate) => summary.skipped += 1,
                Ok(LineOutcome::Unmatched) => summary.unmatched += 1,
                Err(e) => {
                    error!("🏦️ Could not record statement line {}. {e}", line.serial);
                    summary.errored += 1;
                },
            }
        }
        info!("🏦️ Statement run complete. {summary}");
        Ok(summary)
    }
}

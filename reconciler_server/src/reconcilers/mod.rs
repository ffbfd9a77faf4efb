//! The three reconcilers. Each one discovers pending work in the database, asks its channel whether that work has
//! cleared, and applies the answer through the settlement API. A failure on one record is counted and logged, and the
//! run carries on with the next record.
use std::{fmt::Display, future::Future, time::Duration};

mod gateway;
mod ledger;
mod statement;

pub use gateway::GatewayReconciler;
pub use ledger::LedgerReconciler;
pub use statement::StatementReconciler;

use crate::errors::ReconcilerError;

/// Counters for a single reconciler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Payments settled by this run.
    pub processed: usize,
    /// Gateway cancellations plus crypto payments expired by this run.
    pub cancelled: usize,
    /// Records left alone: still pending at the channel, below tolerance, or already settled.
    pub skipped: usize,
    /// Statement lines that could not be tied to a registered payer.
    pub unmatched: usize,
    pub errored: usize,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {}, cancelled: {}, skipped: {}, unmatched: {}, errored: {}",
            self.processed, self.cancelled, self.skipped, self.unmatched, self.errored
        )
    }
}

pub trait Reconciler: Send + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Performs a single reconciliation cycle. An `Err` means the run was abandoned as a whole; nothing it had not
    /// yet committed was written.
    fn run_once(&mut self) -> impl Future<Output = Result<RunSummary, ReconcilerError>> + Send;

    /// Called once after the last cycle, before the worker exits.
    fn finish(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

//! # Storage contracts
//!
//! The reconcilers never talk to a database directly. They go through the traits in this module, which a backend (only
//! SQLite at present) implements.
//!
//! * [`SettlementDatabase`] owns every pending-to-final transition. Its methods are idempotent.
//! * [`ReconciliationQueries`] finds work for the reconcilers and resolves statement payers.
//! * [`SessionStore`] persists banking-portal sessions across restarts.
//! * [`PaymentIntake`] creates the pending records that the reconcilers settle.
mod data_objects;
mod payment_intake;
mod reconciliation_queries;
mod session_store;
mod settlement_database;

pub use data_objects::{
    CancelResult,
    ExpiryResult,
    PayerKey,
    PayerMatch,
    SettleOutcome,
    SettlementEffect,
    SettlementFacts,
    SettlementReceipt,
    StatementCredit,
};
pub use payment_intake::{IntakeError, PaymentIntake};
pub use reconciliation_queries::{QueryError, ReconciliationQueries};
pub use session_store::{SessionStore, SessionStoreError};
pub use settlement_database::{SettlementDatabase, SettlementError};

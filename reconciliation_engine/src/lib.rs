//! Reconciliation Engine
//!
//! The storefront takes payments through three channels that each confirm payment on their own schedule: a card
//! payment gateway, crypto payments to per-order ephemeral wallets, and plain bank transfers that only show up on the
//! merchant's bank statement. This library holds the channel-agnostic core that the reconcilers in
//! `reconciler_server` build on.
//!
//! The library is divided into these sections:
//! 1. Storage contracts ([`mod@traits`]) and the SQLite backend ([`SqliteDatabase`]). The data types stored in the
//!    database are public, in [`mod@db_types`].
//! 2. The settlement API ([`SettlementApi`]). This is the single code path allowed to move a transaction, order or
//!    wallet out of its pending state. Every operation is idempotent, so overlapping reconcilers, retried cycles and
//!    duplicate deliveries all converge on the same final state.
//! 3. Pure helpers: the amount [`tolerance`] law and payer extraction for bank statement lines ([`mod@helpers`]).
//!
//! The engine also publishes events once a change has been committed: a [`events::SettlementEvent`] for
//! notifications and a [`events::UserChangedEvent`] for cache invalidation. Hooks are registered with
//! [`events::EventHooks`].
pub mod db_types;
pub mod events;
pub mod helpers;
mod recon_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use recon_api::{settlement_api::SettlementApi, tolerance};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    PaymentIntake,
    ReconciliationQueries,
    SessionStore,
    SettleOutcome,
    SettlementDatabase,
    SettlementError,
    SettlementFacts,
};

//! # Reconciler server
//!
//! The long-running process that keeps the storefront's payment records in step with the outside world. It hosts
//! three independent reconcilers, each on its own interval:
//!
//! * the **gateway** reconciler verifies recent card payments with the payment gateway, and cancels the ones the payer
//!   abandoned;
//! * the **ledger** reconciler watches per-order crypto wallets, settles funded ones, expires overdue ones and sweeps
//!   settled balances to the custodial wallet;
//! * the **statement** reconciler reads the merchant's bank statement through the internet-banking portal and credits
//!   the wallets of registered payers. The portal session is owned by a [`session::SessionManager`].
//!
//! Every state change goes through [`reconciliation_engine::SettlementApi`], so the reconcilers never need to
//! coordinate with one another.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod integrations;
pub mod reconcilers;
pub mod server;
pub mod session;

#[cfg(test)]
mod test;

use channel_tools::{BankPortalError, GatewayApiError, LedgerApiError, PriceFeedError};
use reconciliation_engine::{
    traits::{QueryError, SessionStoreError},
    SettlementError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize the reconciler. {0}")]
    InitializeError(String),
    #[error("Invalid reconciler configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the reconciler. {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Could not log in to the bank portal after {attempts} attempts. Last error: {last_error}")]
    LoginFailed { attempts: u32, last_error: String },
    #[error("Could not persist the portal session. {0}")]
    StoreError(#[from] SessionStoreError),
}

/// Errors that end a reconciler run early. Per-record failures are counted in the run summary instead.
#[derive(Debug, Clone, Error)]
pub enum ReconcilerError {
    #[error("Could not query for pending work. {0}")]
    QueryError(#[from] QueryError),
    #[error("Settlement failed. {0}")]
    SettlementError(#[from] SettlementError),
    #[error("No usable bank portal session. {0}")]
    SessionError(#[from] SessionError),
    #[error("Bank portal request failed. {0}")]
    BankPortalError(#[from] BankPortalError),
    #[error("Payment gateway request failed. {0}")]
    GatewayError(#[from] GatewayApiError),
    #[error("Ledger request failed. {0}")]
    LedgerError(#[from] LedgerApiError),
    #[error("Price feed request failed. {0}")]
    PriceFeedError(#[from] PriceFeedError),
    #[error("Cannot price an order with a zero asset price")]
    InvalidPrice,
}

use thiserror::Error;

use crate::rest::RestError;

#[derive(Debug, Clone, Error)]
pub enum GatewayApiError {
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("Gateway response is missing the {0} field")]
    MissingField(&'static str),
    #[error("Invalid gateway value: {0}")]
    InvalidValue(String),
    #[error("Inquiry rejected. Code {code}. {message}")]
    InquiryRejected { code: i64, message: String },
}

#[derive(Debug, Clone, Error)]
pub enum LedgerApiError {
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("Invalid balance reported for {address}: {value}")]
    InvalidBalance { address: String, value: String },
    #[error("Sweep to {destination} was rejected: {reason}")]
    SweepRejected { destination: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum PriceFeedError {
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("No price is available for {0}")]
    NoPrice(String),
    #[error("Price for {asset} is quoted in {currency}, not IRR")]
    UnexpectedCurrency { asset: String, currency: String },
}

#[derive(Debug, Clone, Error)]
pub enum BankPortalError {
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("Login was rejected: {0}")]
    LoginRejected(String),
    #[error("Invalid statement line {serial}: {reason}")]
    InvalidStatementLine { serial: String, reason: String },
}

impl BankPortalError {
    /// Authentication-class failures mean the session is dead even if it looks valid locally: an explicit 401/403, or
    /// an HTML page (usually the login form) where JSON was expected.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Rest(RestError::QueryError { status, .. }) => matches!(status, 401 | 403),
            Self::Rest(RestError::NotJson { .. }) => true,
            _ => false,
        }
    }
}

//! Clients for the external services the reconcilers talk to.
//!
//! Each service is described by a trait ([`PaymentGateway`], [`LedgerNode`], [`PriceFeed`], [`BankPortal`]) so the
//! reconcilers can be driven by in-memory fakes in tests, plus a `reqwest` implementation configured from the
//! environment. All implementations share [`RestClient`], which applies a per-request timeout and tells an HTML page
//! apart from a malformed JSON body.
mod bank_portal;
mod config;
mod error;
mod gateway;
mod ledger;
mod price_feed;
mod rest;

pub use bank_portal::{BankPortal, BankPortalApi, PortalSession, StatementLine, CSRF_HEADER, DEFAULT_IDLE_TIMEOUT_SECS};
pub use config::{
    http_timeout_from_env,
    BankPortalConfig,
    GatewayConfig,
    LedgerConfig,
    PriceFeedConfig,
    DEFAULT_HTTP_TIMEOUT,
};
pub use error::{BankPortalError, GatewayApiError, LedgerApiError, PriceFeedError};
pub use gateway::{
    GatewayApi,
    InquiryResult,
    PaymentGateway,
    VerifiedPayment,
    VerifyResult,
    INQUIRY_STATUS_CANCELLED,
    VERIFY_ALREADY_VERIFIED,
    VERIFY_SUCCESS,
};
pub use ledger::{LedgerApi, LedgerNode};
pub use price_feed::{PriceFeed, PriceFeedApi};
pub use rest::{RestClient, RestError};

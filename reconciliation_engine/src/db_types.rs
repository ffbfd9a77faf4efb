use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub use pay_common::{MicroUnits, Rial};

/// Order numbers issued by the storefront start with this prefix, e.g. `OS100007`.
pub const ORDER_PREFIX: &str = "OS";
/// Wallet top-ups carry an `order_ref` of the form `WC-<user id>-<timestamp>`.
pub const WALLET_CHARGE_PREFIX: &str = "WC";

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind} value: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError::new($kind, s)),
                }
            }
        }
    };
}

//--------------------------------------  TransactionStatus    ---------------------------------------------------------
/// A transaction leaves `Pending` at most once. Every other transition is rejected by the conditional updates in the
/// storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

text_enum!(TransactionStatus, "transaction status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

//--------------------------------------     PaymentType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Gateway,
    Crypto,
    Statement,
}

text_enum!(PaymentType, "payment type", {
    Gateway => "gateway",
    Crypto => "crypto",
    Statement => "statement",
});

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// The order has been placed and is waiting for its payment to clear.
    Pending,
    /// Payment has been confirmed by one of the reconcilers.
    Completed,
    Failed,
    /// The payment was cancelled at the gateway, or the crypto payment window expired.
    Cancelled,
}

text_enum!(OrderStatusType, "order status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

//--------------------------------------    PaymentMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Gateway,
    Crypto,
    Statement,
    Wallet,
}

text_enum!(PaymentMethod, "payment method", {
    Gateway => "gateway",
    Crypto => "crypto",
    Statement => "statement",
    Wallet => "wallet",
});

//------------------------------------- CryptoPaymentStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CryptoPaymentStatus {
    Pending,
    Completed,
    Expired,
}

text_enum!(CryptoPaymentStatus, "crypto payment status", {
    Pending => "pending",
    Completed => "completed",
    Expired => "expired",
});

//--------------------------------------     OrderNumber       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------       OrderRef        ---------------------------------------------------------
/// What a transaction pays for, decoded from its `order_ref` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    /// Payment for a storefront order.
    Order(OrderNumber),
    /// A wallet top-up. The tag is kept verbatim; the user comes from the transaction row.
    WalletCharge(String),
    /// Anything else. Settlement refuses these rather than guessing.
    Unrecognized(String),
}

impl OrderRef {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let upper = s.to_ascii_uppercase();
        if upper.starts_with(WALLET_CHARGE_PREFIX) {
            Self::WalletCharge(s.to_string())
        } else if upper.starts_with(ORDER_PREFIX) && s.len() > ORDER_PREFIX.len() {
            Self::Order(OrderNumber(s.to_string()))
        } else {
            Self::Unrecognized(s.to_string())
        }
    }

    pub fn wallet_charge_tag(user_id: i64, at: DateTime<Utc>) -> String {
        format!("{WALLET_CHARGE_PREFIX}-{user_id}-{}", at.timestamp())
    }
}

impl Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderRef::Order(n) => write!(f, "order {n}"),
            OrderRef::WalletCharge(tag) => write!(f, "wallet charge {tag}"),
            OrderRef::Unrecognized(s) => write!(f, "unrecognized reference '{s}'"),
        }
    }
}

//--------------------------------------      Transaction      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: i64,
    /// Gateway-issued for gateway payments; synthetic for crypto and statement payments.
    pub track_id: String,
    pub order_ref: String,
    pub user_id: i64,
    pub amount: Rial,
    pub status: TransactionStatus,
    pub payment_type: PaymentType,
    pub ref_number: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Channel-specific idempotency key, e.g. the bank serial of a statement line.
    pub dedupe_key: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn order_ref(&self) -> OrderRef {
        OrderRef::parse(&self.order_ref)
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub track_id: String,
    pub order_ref: String,
    pub user_id: i64,
    pub amount: Rial,
    pub payment_type: PaymentType,
    pub dedupe_key: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(
        track_id: impl Into<String>,
        order_ref: impl Into<String>,
        user_id: i64,
        amount: Rial,
        payment_type: PaymentType,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            order_ref: order_ref.into(),
            user_id,
            amount,
            payment_type,
            dedupe_key: None,
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_dedupe_key<S: Into<String>>(mut self, key: S) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub user_id: i64,
    pub amount: Rial,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    /// Receiving address for crypto orders, copied from the crypto payment when the order was placed.
    pub wallet_address: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub user_id: i64,
    pub amount: Rial,
    pub payment_method: PaymentMethod,
    pub wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_number: OrderNumber, user_id: i64, amount: Rial, payment_method: PaymentMethod) -> Self {
        Self { order_number, user_id, amount, payment_method, wallet_address: None, created_at: Utc::now() }
    }

    pub fn with_wallet_address<S: Into<String>>(mut self, address: S) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

//--------------------------------------    CryptoPayment      ---------------------------------------------------------
#[derive(Clone, FromRow)]
pub struct CryptoPayment {
    pub id: i64,
    pub transaction_id: i64,
    pub address: String,
    /// Key material for the ephemeral receiving wallet. Only ever handed to the ledger sweep.
    pub private_key: String,
    pub asset: String,
    pub expected_amount: MicroUnits,
    pub status: CryptoPaymentStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for CryptoPayment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoPayment")
            .field("id", &self.id)
            .field("transaction_id", &self.transaction_id)
            .field("address", &self.address)
            .field("private_key", &"****")
            .field("asset", &self.asset)
            .field("expected_amount", &self.expected_amount)
            .field("status", &self.status)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CryptoPayment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone)]
pub struct NewCryptoPayment {
    pub transaction_id: i64,
    pub address: String,
    pub private_key: String,
    pub asset: String,
    pub expected_amount: MicroUnits,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------      UserWallet       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserWallet {
    pub user_id: i64,
    pub balance: Rial,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     PayerAccount      ---------------------------------------------------------
/// A bank identity registered by a user. IBANs are stored as their 24 normalized digits, without the `IR` prefix.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayerAccount {
    pub id: i64,
    pub user_id: i64,
    pub iban: Option<String>,
    pub account_number: Option<String>,
    pub national_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPayerAccount {
    pub user_id: i64,
    pub iban: Option<String>,
    pub account_number: Option<String>,
    pub national_id: Option<String>,
}

impl NewPayerAccount {
    pub fn new(user_id: i64) -> Self {
        Self { user_id, ..Default::default() }
    }

    pub fn with_iban<S: AsRef<str>>(mut self, iban: S) -> Self {
        self.iban = Some(crate::helpers::normalize_iban(iban.as_ref()));
        self
    }

    pub fn with_account_number<S: AsRef<str>>(mut self, account: S) -> Self {
        self.account_number = Some(pay_common::helpers::digits_only(account.as_ref()));
        self
    }

    pub fn with_national_id<S: AsRef<str>>(mut self, national_id: S) -> Self {
        self.national_id = Some(pay_common::helpers::digits_only(national_id.as_ref()));
        self
    }
}

//--------------------------------------      AuthSession      ---------------------------------------------------------
/// An authenticated banking-portal session, as persisted between process restarts.
#[derive(Clone, FromRow, PartialEq, Eq)]
pub struct AuthSession {
    /// Which portal/credential set this session belongs to.
    pub channel: String,
    pub session_token: String,
    pub csrf_token: String,
    /// Raw `Cookie` header value returned at login.
    pub cookies: String,
    pub expires_at: DateTime<Utc>,
    pub idle_timeout_secs: i64,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("channel", &self.channel)
            .field("expires_at", &self.expires_at)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("last_activity_at", &self.last_activity_at)
            .finish_non_exhaustive()
    }
}

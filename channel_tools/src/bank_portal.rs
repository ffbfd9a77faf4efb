use std::future::Future;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::*;
use pay_common::{helpers::normalize_digits, Rial};
use reqwest::{
    header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE},
    Method,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    config::BankPortalConfig,
    rest::{RestClient, RestError},
    BankPortalError,
};

pub const CSRF_HEADER: &str = "X-CSRF-Token";
/// Idle budget assumed when the portal does not report one.
pub const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 900;

/// An authenticated portal session, as returned by [`BankPortal::login`].
#[derive(Clone, PartialEq, Eq)]
pub struct PortalSession {
    pub session_token: String,
    pub csrf_token: String,
    /// Value for the `Cookie` request header.
    pub cookies: String,
    pub expires_at: DateTime<Utc>,
    pub idle_timeout_secs: i64,
}

impl std::fmt::Debug for PortalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalSession")
            .field("expires_at", &self.expires_at)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    /// Bank-assigned serial, unique per account.
    pub serial: String,
    /// Signed amount: credits are positive, debits negative.
    pub amount: Rial,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub balance_after: Option<Rial>,
}

impl StatementLine {
    pub fn is_credit(&self) -> bool {
        self.amount.is_positive()
    }
}

pub trait BankPortal: Send + Sync {
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<PortalSession, BankPortalError>> + Send;

    /// Statement lines for `account` between `from` and `to`. Lines the portal returns in an unreadable shape are
    /// logged and left out.
    fn statement(
        &self,
        account: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        session: &PortalSession,
    ) -> impl Future<Output = Result<Vec<StatementLine>, BankPortalError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    session_token: Option<String>,
    csrf_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    idle_timeout_seconds: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    lines: Vec<RawStatementLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatementLine {
    serial: Value,
    amount: Value,
    timestamp: String,
    #[serde(default)]
    description: String,
    balance_after: Option<Value>,
}

#[derive(Clone)]
pub struct BankPortalApi {
    client: RestClient,
}

impl BankPortalApi {
    pub fn new(config: &BankPortalConfig) -> Result<Self, BankPortalError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = RestClient::new(&config.url, config.timeout, headers)?;
        Ok(Self { client })
    }

    fn session_headers(session: &PortalSession) -> Result<HeaderMap, BankPortalError> {
        let mut headers = HeaderMap::with_capacity(2);
        let cookie = HeaderValue::from_str(&session.cookies).map_err(|e| RestError::Initialization(e.to_string()))?;
        let csrf = HeaderValue::from_str(&session.csrf_token).map_err(|e| RestError::Initialization(e.to_string()))?;
        headers.insert(COOKIE, cookie);
        headers.insert(CSRF_HEADER, csrf);
        Ok(headers)
    }
}

impl BankPortal for BankPortalApi {
    async fn login(&self, username: &str, password: &str) -> Result<PortalSession, BankPortalError> {
        debug!("🔑️ Logging in to the bank portal as {username}");
        let body = json!({ "username": username, "password": password });
        let result = self
            .client
            .rest_query_with_headers::<LoginResponse, Value>(Method::POST, "/api/v1/auth/login", &[], None, Some(body))
            .await;
        let (headers, response) = match result {
            Ok(r) => r,
            Err(RestError::QueryError { status: 401 | 403, message }) => {
                return Err(BankPortalError::LoginRejected(message));
            },
            Err(e) => return Err(e.into()),
        };
        if let Some(reason) = response.error {
            return Err(BankPortalError::LoginRejected(reason));
        }
        let session_token =
            response.session_token.ok_or_else(|| BankPortalError::LoginRejected("no session token issued".into()))?;
        let csrf_token = response.csrf_token.unwrap_or_default();
        let expires_at = response
            .expires_at
            .ok_or_else(|| BankPortalError::LoginRejected("session expiry was not reported".into()))?;
        let idle_timeout_secs = response.idle_timeout_seconds.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        let cookies = cookie_header(&headers).unwrap_or_else(|| format!("SESSION={session_token}"));
        info!("🔑️ Logged in to the bank portal. Session expires at {expires_at}");
        Ok(PortalSession { session_token, csrf_token, cookies, expires_at, idle_timeout_secs })
    }

    async fn statement(
        &self,
        account: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        session: &PortalSession,
    ) -> Result<Vec<StatementLine>, BankPortalError> {
        let headers = Self::session_headers(session)?;
        let path = format!("/api/v1/accounts/{account}/statement");
        let (from, to) = (from.to_rfc3339(), to.to_rfc3339());
        let params = [("from", from.as_str()), ("to", to.as_str())];
        debug!("🏦️ Fetching statement for {account} from {from} to {to}");
        let response =
            self.client.rest_query::<StatementResponse, ()>(Method::GET, &path, &params, Some(headers), None).await?;
        let total = response.lines.len();
        let lines = response
            .lines
            .into_iter()
            .filter_map(|raw| match parse_line(raw) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("🏦️ Skipping statement line. {e}");
                    None
                },
            })
            .collect::<Vec<_>>();
        debug!("🏦️ Statement for {account} has {} readable lines out of {total}", lines.len());
        Ok(lines)
    }
}

/// Joins the `name=value` pairs of every `Set-Cookie` header into a single `Cookie` header value.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let pairs = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| v.contains('='))
        .collect::<Vec<_>>();
    (!pairs.is_empty()).then(|| pairs.join("; "))
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn parse_line(raw: RawStatementLine) -> Result<StatementLine, BankPortalError> {
    let serial = normalize_digits(&value_text(&raw.serial));
    let invalid = |reason: String| BankPortalError::InvalidStatementLine { serial: serial.clone(), reason };
    if serial.is_empty() {
        return Err(invalid("missing serial".into()));
    }
    let amount = value_text(&raw.amount).parse::<Rial>().map_err(|e| invalid(e.to_string()))?;
    let timestamp =
        parse_timestamp(&raw.timestamp).ok_or_else(|| invalid(format!("bad timestamp {}", raw.timestamp)))?;
    let balance_after = match raw.balance_after.as_ref().map(value_text) {
        Some(b) if !b.is_empty() && b != "null" => Some(b.parse::<Rial>().map_err(|e| invalid(e.to_string()))?),
        _ => None,
    };
    Ok(StatementLine { serial, amount, timestamp, description: raw.description, balance_after })
}

/// Portals report either RFC 3339 or a bare `YYYY-MM-DD HH:MM:SS`, which is taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = normalize_digits(s.trim());
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&s, fmt).ok())
        .map(|naive| naive.and_utc())
}

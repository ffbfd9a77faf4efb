use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use channel_tools::{
    BankPortal,
    BankPortalError,
    GatewayApiError,
    InquiryResult,
    LedgerApiError,
    LedgerNode,
    PaymentGateway,
    PortalSession,
    PriceFeed,
    PriceFeedError,
    RestError,
    StatementLine,
    VerifiedPayment,
    VerifyResult,
};
use chrono::{DateTime, Duration, Utc};
use pay_common::{MicroUnits, Rial};

//--------------------------------------      FakeGateway      ---------------------------------------------------------
#[derive(Default)]
struct GatewayState {
    verified: HashMap<String, VerifiedPayment>,
    cancelled: Vec<String>,
    unreachable: Vec<String>,
    verify_calls: Vec<String>,
    inquiry_calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify_succeeds(&self, track_id: &str, amount: Rial, ref_number: &str) {
        let payment = VerifiedPayment { ref_number: ref_number.into(), amount, paid_at: Utc::now() };
        self.state.lock().unwrap().verified.insert(track_id.into(), payment);
    }

    pub fn cancelled(&self, track_id: &str) {
        self.state.lock().unwrap().cancelled.push(track_id.into());
    }

    pub fn unreachable_for(&self, track_id: &str) {
        self.state.lock().unwrap().unreachable.push(track_id.into());
    }

    pub fn verify_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().verify_calls.clone()
    }

    pub fn inquiry_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().inquiry_calls.clone()
    }
}

impl PaymentGateway for FakeGateway {
    async fn verify(&self, track_id: &str) -> Result<VerifyResult, GatewayApiError> {
        let mut state = self.state.lock().unwrap();
        state.verify_calls.push(track_id.into());
        if state.unreachable.iter().any(|t| t == track_id) {
            return Err(RestError::Timeout("gateway did not answer".into()).into());
        }
        Ok(match state.verified.get(track_id) {
            Some(p) => VerifyResult::Verified(p.clone()),
            None => VerifyResult::Failed { code: 202, message: "payment not completed".into() },
        })
    }

    async fn inquiry(&self, track_id: &str) -> Result<InquiryResult, GatewayApiError> {
        let mut state = self.state.lock().unwrap();
        state.inquiry_calls.push(track_id.into());
        let status = if state.cancelled.iter().any(|t| t == track_id) { 3 } else { 1 };
        Ok(InquiryResult { status, message: "ok".into() })
    }
}

//--------------------------------------      FakeLedger       ---------------------------------------------------------
#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, MicroUnits>,
    sweeps: Vec<(String, String)>,
    reject_sweeps: bool,
}

#[derive(Clone, Default)]
pub struct FakeLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &str, balance: MicroUnits) {
        self.state.lock().unwrap().balances.insert(address.into(), balance);
    }

    pub fn reject_sweeps(&self) {
        self.state.lock().unwrap().reject_sweeps = true;
    }

    /// `(private_key, destination)` for every sweep requested so far.
    pub fn sweeps(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sweeps.clone()
    }
}

impl LedgerNode for FakeLedger {
    async fn get_balance(&self, address: &str) -> Result<MicroUnits, LedgerApiError> {
        Ok(self.state.lock().unwrap().balances.get(address).copied().unwrap_or_default())
    }

    async fn sweep(&self, private_key: &str, destination: &str) -> Result<String, LedgerApiError> {
        let mut state = self.state.lock().unwrap();
        state.sweeps.push((private_key.into(), destination.into()));
        if state.reject_sweeps {
            return Err(LedgerApiError::SweepRejected { destination: destination.into(), reason: "no fee".into() });
        }
        Ok(format!("tx-{}", state.sweeps.len()))
    }
}

//--------------------------------------     FakePriceFeed     ---------------------------------------------------------
#[derive(Clone, Default)]
pub struct FakePriceFeed {
    price: Arc<Mutex<Option<Rial>>>,
    calls: Arc<Mutex<u32>>,
}

impl FakePriceFeed {
    pub fn with_price(price: Rial) -> Self {
        Self { price: Arc::new(Mutex::new(Some(price))), calls: Arc::default() }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl PriceFeed for FakePriceFeed {
    async fn price(&self, asset: &str) -> Result<Rial, PriceFeedError> {
        *self.calls.lock().unwrap() += 1;
        let price = *self.price.lock().unwrap();
        price.ok_or_else(|| PriceFeedError::NoPrice(asset.into()))
    }
}

//--------------------------------------      FakePortal       ---------------------------------------------------------
#[derive(Default)]
struct PortalState {
    logins: u32,
    failing_logins: u32,
    lines: Vec<StatementLine>,
    scripted: VecDeque<Result<Vec<StatementLine>, BankPortalError>>,
    statement_calls: u32,
    tokens_seen: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_logins(&self, count: u32) {
        self.state.lock().unwrap().failing_logins = count;
    }

    /// Lines served by every statement request that has no scripted response.
    pub fn set_lines(&self, lines: Vec<StatementLine>) {
        self.state.lock().unwrap().lines = lines;
    }

    /// Queues a response for the next statement request.
    pub fn then_respond(&self, response: Result<Vec<StatementLine>, BankPortalError>) {
        self.state.lock().unwrap().scripted.push_back(response);
    }

    pub fn login_count(&self) -> u32 {
        self.state.lock().unwrap().logins
    }

    pub fn statement_calls(&self) -> u32 {
        self.state.lock().unwrap().statement_calls
    }

    /// The session token presented with each statement request, in order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens_seen.clone()
    }
}

impl BankPortal for FakePortal {
    async fn login(&self, _username: &str, _password: &str) -> Result<PortalSession, BankPortalError> {
        let mut state = self.state.lock().unwrap();
        state.logins += 1;
        if state.failing_logins > 0 {
            state.failing_logins -= 1;
            return Err(RestError::QueryError { status: 503, message: "maintenance".into() }.into());
        }
        let token = format!("session-{}", state.logins);
        Ok(PortalSession {
            cookies: format!("SESSION={token}"),
            csrf_token: format!("csrf-{}", state.logins),
            session_token: token,
            expires_at: Utc::now() + Duration::hours(2),
            idle_timeout_secs: 900,
        })
    }

    async fn statement(
        &self,
        _account: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        session: &PortalSession,
    ) -> Result<Vec<StatementLine>, BankPortalError> {
        let mut state = self.state.lock().unwrap();
        state.statement_calls += 1;
        state.tokens_seen.push(session.session_token.clone());
        match state.scripted.pop_front() {
            Some(response) => response,
            None => Ok(state.lines.clone()),
        }
    }
}

pub fn html_response() -> BankPortalError {
    RestError::NotJson { content_type: "text/html".into() }.into()
}

pub fn credit_line(serial: &str, amount: i64, description: &str) -> StatementLine {
    StatementLine {
        serial: serial.into(),
        amount: Rial::from(amount),
        timestamp: Utc::now() - Duration::minutes(30),
        description: description.into(),
        balance_after: None,
    }
}

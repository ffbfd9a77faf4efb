use std::future::Future;

use chrono::{DateTime, Utc};
use log::*;
use pay_common::Rial;
use reqwest::{header::HeaderMap, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{config::GatewayConfig, rest::RestClient, GatewayApiError};

/// Verify succeeded on this call.
pub const VERIFY_SUCCESS: i64 = 100;
/// Verify already succeeded on an earlier call. The payment is settled all the same.
pub const VERIFY_ALREADY_VERIFIED: i64 = 201;
/// Inquiry status for a payment the payer cancelled or that timed out at the gateway.
pub const INQUIRY_STATUS_CANCELLED: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedPayment {
    pub ref_number: String,
    pub amount: Rial,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Verified(VerifiedPayment),
    Failed { code: i64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryResult {
    pub status: i64,
    pub message: String,
}

impl InquiryResult {
    pub fn is_cancelled(&self) -> bool {
        self.status == INQUIRY_STATUS_CANCELLED
    }
}

pub trait PaymentGateway: Send + Sync {
    /// Asks the gateway to confirm the payment for `track_id`. A failure code is a normal result, not an error.
    fn verify(&self, track_id: &str) -> impl Future<Output = Result<VerifyResult, GatewayApiError>> + Send;

    fn inquiry(&self, track_id: &str) -> impl Future<Output = Result<InquiryResult, GatewayApiError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    result: i64,
    #[serde(default)]
    message: String,
    ref_number: Option<Value>,
    amount: Option<Value>,
    paid_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InquiryResponse {
    result: i64,
    #[serde(default)]
    message: String,
    status: Option<i64>,
}

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: RestClient,
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let client = RestClient::new(&config.url, config.timeout, HeaderMap::new())?;
        Ok(Self { config, client })
    }

    fn request_body(&self, track_id: &str) -> Value {
        json!({ "merchant": self.config.merchant.reveal(), "trackId": track_id })
    }
}

impl PaymentGateway for GatewayApi {
    async fn verify(&self, track_id: &str) -> Result<VerifyResult, GatewayApiError> {
        debug!("💳️ Verifying payment [{track_id}]");
        let body = self.request_body(track_id);
        let response =
            self.client.rest_query::<VerifyResponse, Value>(Method::POST, "/v1/verify", &[], None, Some(body)).await?;
        trace!("💳️ Verify response for [{track_id}]: {response:?}");
        verify_result(response)
    }

    async fn inquiry(&self, track_id: &str) -> Result<InquiryResult, GatewayApiError> {
        debug!("💳️ Inquiring after payment [{track_id}]");
        let body = self.request_body(track_id);
        let response =
            self.client.rest_query::<InquiryResponse, Value>(Method::POST, "/v1/inquiry", &[], None, Some(body)).await?;
        if response.result != VERIFY_SUCCESS {
            return Err(GatewayApiError::InquiryRejected { code: response.result, message: response.message });
        }
        let status = response.status.ok_or(GatewayApiError::MissingField("status"))?;
        Ok(InquiryResult { status, message: response.message })
    }
}

fn verify_result(response: VerifyResponse) -> Result<VerifyResult, GatewayApiError> {
    if !matches!(response.result, VERIFY_SUCCESS | VERIFY_ALREADY_VERIFIED) {
        return Ok(VerifyResult::Failed { code: response.result, message: response.message });
    }
    let ref_number =
        response.ref_number.as_ref().map(value_as_string).ok_or(GatewayApiError::MissingField("refNumber"))?;
    let amount = response.amount.as_ref().ok_or(GatewayApiError::MissingField("amount"))?;
    let amount = value_as_string(amount)
        .parse::<Rial>()
        .map_err(|e| GatewayApiError::InvalidValue(format!("amount: {e}")))?;
    let paid_at = response.paid_at.as_deref().ok_or(GatewayApiError::MissingField("paidAt"))?;
    let paid_at = DateTime::parse_from_rfc3339(paid_at)
        .map_err(|e| GatewayApiError::InvalidValue(format!("paidAt {paid_at}: {e}")))?
        .with_timezone(&Utc);
    Ok(VerifyResult::Verified(VerifiedPayment { ref_number, amount, paid_at }))
}

/// Gateways are inconsistent about quoting numeric fields.
fn value_as_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use mockito::Matcher;

    use super::*;

    fn gateway(url: &str) -> GatewayApi {
        GatewayApi::new(GatewayConfig::new(url, "merchant-1")).unwrap()
    }

    #[tokio::test]
    async fn verify_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/verify")
            .match_body(Matcher::PartialJson(json!({"merchant": "merchant-1", "trackId": "3714061657"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"result":100,"message":"success","refNumber":71425018,"amount":2500000,
                    "paidAt":"2024-06-01T10:15:00.000+03:30"}"#,
            )
            .create_async()
            .await;
        let result = gateway(&server.url()).verify("3714061657").await.unwrap();
        let VerifyResult::Verified(payment) = result else { panic!("Expected a verified payment, got {result:?}") };
        assert_eq!(payment.ref_number, "71425018");
        assert_eq!(payment.amount, Rial::from(2_500_000));
        assert_eq!(payment.paid_at.to_rfc3339(), "2024-06-01T06:45:00+00:00");
    }

    #[tokio::test]
    async fn already_verified_is_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/verify")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"result":201,"message":"already verified","refNumber":"71425018","amount":"2500000",
                    "paidAt":"2024-06-01T06:45:00Z"}"#,
            )
            .create_async()
            .await;
        let result = gateway(&server.url()).verify("3714061657").await.unwrap();
        assert!(matches!(result, VerifyResult::Verified(p) if p.amount == Rial::from(2_500_000)));
    }

    #[tokio::test]
    async fn verify_failure_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/verify")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":202,"message":"payment not completed"}"#)
            .create_async()
            .await;
        let result = gateway(&server.url()).verify("1").await.unwrap();
        assert_eq!(result, VerifyResult::Failed { code: 202, message: "payment not completed".into() });
    }

    #[tokio::test]
    async fn inquiry_cancelled() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/inquiry")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":100,"message":"success","status":3}"#)
            .create_async()
            .await;
        let result = gateway(&server.url()).inquiry("1").await.unwrap();
        assert!(result.is_cancelled());
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/v1/verify").with_status(502).with_body("bad gateway").create_async().await;
        let err = gateway(&server.url()).verify("1").await.unwrap_err();
        assert!(matches!(err, GatewayApiError::Rest(e) if e.is_transient()));
    }
}

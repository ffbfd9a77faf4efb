use std::future::Future;

use log::*;
use pay_common::MicroUnits;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    config::LedgerConfig,
    rest::{RestClient, RestError},
    LedgerApiError,
};

pub trait LedgerNode: Send + Sync {
    fn get_balance(&self, address: &str) -> impl Future<Output = Result<MicroUnits, LedgerApiError>> + Send;

    /// Moves the whole balance of the wallet owned by `private_key` to `destination`, returning the ledger txid.
    fn sweep(
        &self,
        private_key: &str,
        destination: &str,
    ) -> impl Future<Output = Result<String, LedgerApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Value,
}

#[derive(Debug, Deserialize)]
struct SweepResponse {
    txid: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct LedgerApi {
    client: RestClient,
}

impl LedgerApi {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        if !config.api_key.is_empty() {
            let val = HeaderValue::from_str(config.api_key.reveal().as_str())
                .map_err(|e| RestError::Initialization(e.to_string()))?;
            headers.insert("X-Api-Key", val);
        }
        let client = RestClient::new(&config.url, config.timeout, headers)?;
        Ok(Self { client })
    }
}

impl LedgerNode for LedgerApi {
    async fn get_balance(&self, address: &str) -> Result<MicroUnits, LedgerApiError> {
        let path = format!("/v1/addresses/{address}/balance");
        let response = self.client.rest_query::<BalanceResponse, ()>(Method::GET, &path, &[], None, None).await?;
        let value = match response.balance {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let balance = value
            .parse::<MicroUnits>()
            .map_err(|_| LedgerApiError::InvalidBalance { address: address.to_string(), value: value.clone() })?;
        trace!("⛓️ Balance of {address} is {balance}");
        Ok(balance)
    }

    async fn sweep(&self, private_key: &str, destination: &str) -> Result<String, LedgerApiError> {
        let body = json!({ "privateKey": private_key, "destination": destination });
        let response =
            self.client.rest_query::<SweepResponse, Value>(Method::POST, "/v1/sweep", &[], None, Some(body)).await?;
        match (response.txid, response.error) {
            (Some(txid), None) => Ok(txid),
            (_, reason) => Err(LedgerApiError::SweepRejected {
                destination: destination.to_string(),
                reason: reason.unwrap_or_else(|| "no txid returned".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use mockito::Matcher;

    use super::*;

    fn ledger(url: &str) -> LedgerApi {
        LedgerApi::new(LedgerConfig::new(url, "ledger-key")).unwrap()
    }

    #[tokio::test]
    async fn balance_as_decimal_string() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(r"^/v1/addresses/TAddr1/balance$".into()))
            .match_header("x-api-key", "ledger-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"address":"TAddr1","balance":"119.5"}"#)
            .create_async()
            .await;
        let balance = ledger(&server.url()).get_balance("TAddr1").await.unwrap();
        assert_eq!(balance, MicroUnits::from(119_500_000));
    }

    #[tokio::test]
    async fn balance_as_number() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/addresses/TAddr2/balance")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"balance":0}"#)
            .create_async()
            .await;
        let balance = ledger(&server.url()).get_balance("TAddr2").await.unwrap();
        assert!(balance.is_zero());
    }

    #[tokio::test]
    async fn garbage_balance() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/addresses/TAddr3/balance")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"balance":"lots"}"#)
            .create_async()
            .await;
        let err = ledger(&server.url()).get_balance("TAddr3").await.unwrap_err();
        assert!(matches!(err, LedgerApiError::InvalidBalance { value, .. } if value == "lots"));
    }

    #[tokio::test]
    async fn sweep_returns_txid() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/sweep")
            .match_body(Matcher::PartialJson(json!({"destination": "TCustody"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"txid":"abc123"}"#)
            .create_async()
            .await;
        let txid = ledger(&server.url()).sweep("pk", "TCustody").await.unwrap();
        assert_eq!(txid, "abc123");
    }

    #[tokio::test]
    async fn sweep_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/sweep")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"insufficient balance for fee"}"#)
            .create_async()
            .await;
        let err = ledger(&server.url()).sweep("pk", "TCustody").await.unwrap_err();
        assert!(matches!(err, LedgerApiError::SweepRejected { reason, .. } if reason.contains("fee")));
    }
}

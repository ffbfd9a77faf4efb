use std::future::Future;

use log::*;
use pay_common::{Rial, RIAL_CURRENCY_CODE};
use reqwest::{header::HeaderMap, Method};
use serde::Deserialize;
use serde_json::Value;

use crate::{config::PriceFeedConfig, rest::RestClient, PriceFeedError};

pub trait PriceFeed: Send + Sync {
    /// The current price of one whole unit of `asset`, in Rial.
    fn price(&self, asset: &str) -> impl Future<Output = Result<Rial, PriceFeedError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Option<Value>,
    currency: Option<String>,
}

#[derive(Clone)]
pub struct PriceFeedApi {
    client: RestClient,
}

impl PriceFeedApi {
    pub fn new(config: PriceFeedConfig) -> Result<Self, PriceFeedError> {
        let client = RestClient::new(&config.url, config.timeout, HeaderMap::new())?;
        Ok(Self { client })
    }
}

impl PriceFeed for PriceFeedApi {
    async fn price(&self, asset: &str) -> Result<Rial, PriceFeedError> {
        let path = format!("/v1/prices/{}", asset.to_ascii_uppercase());
        let response = self.client.rest_query::<PriceResponse, ()>(Method::GET, &path, &[], None, None).await?;
        if let Some(currency) = response.currency.filter(|c| !c.eq_ignore_ascii_case(RIAL_CURRENCY_CODE)) {
            return Err(PriceFeedError::UnexpectedCurrency { asset: asset.to_string(), currency });
        }
        let price = match response.price {
            Some(Value::String(s)) => s.parse::<Rial>().ok(),
            Some(Value::Number(n)) => n.as_i64().map(Rial::from),
            _ => None,
        };
        match price {
            Some(p) if p.is_positive() => {
                trace!("⛓️ {asset} is quoted at {p}");
                Ok(p)
            },
            _ => Err(PriceFeedError::NoPrice(asset.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feed(url: &str) -> PriceFeedApi {
        PriceFeedApi::new(PriceFeedConfig::new(url)).unwrap()
    }

    #[tokio::test]
    async fn quoted_price() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/prices/TON")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"asset":"TON","price":"2,150,000","currency":"IRR"}"#)
            .create_async()
            .await;
        let price = feed(&server.url()).price("ton").await.unwrap();
        assert_eq!(price, Rial::from(2_150_000));
    }

    #[tokio::test]
    async fn wrong_currency() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/prices/TON")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"price":5.1,"currency":"USD"}"#)
            .create_async()
            .await;
        let err = feed(&server.url()).price("TON").await.unwrap_err();
        assert!(matches!(err, PriceFeedError::UnexpectedCurrency { currency, .. } if currency == "USD"));
    }

    #[tokio::test]
    async fn zero_is_no_price() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/prices/TON")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"price":0}"#)
            .create_async()
            .await;
        let err = feed(&server.url()).price("TON").await.unwrap_err();
        assert!(matches!(err, PriceFeedError::NoPrice(_)));
    }
}

use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RestError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Expected JSON, but received {content_type}")]
    NotJson { content_type: String },
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl RestError {
    /// True for network failures, timeouts and 5xx responses. These leave no trace and can be retried next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RestResponseError(_) => true,
            Self::QueryError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::RestResponseError(e.to_string())
        }
    }
}

/// A thin JSON-over-HTTP client shared by the channel clients. Every request is bounded by the timeout given at
/// construction.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Arc<Client>,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration, headers: HeaderMap) -> Result<Self, RestError> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::Initialization(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<T, RestError> {
        self.rest_query_with_headers(method, path, params, headers, body).await.map(|(_, v)| v)
    }

    /// As [`RestClient::rest_query`], but also returns the response headers.
    pub async fn rest_query_with_headers<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<(HeaderMap, T), RestError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(headers) = headers {
            req = req.headers(headers);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let status = status.as_u16();
            let message = response.text().await?;
            return Err(RestError::QueryError { status, message });
        }
        trace!("REST query successful. {status}");
        let headers = response.headers().clone();
        let content_type =
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default().to_ascii_lowercase();
        let text = response.text().await?;
        let value = parse_json_body(&content_type, &text)?;
        Ok((headers, value))
    }
}

/// Some portals answer an expired session with a `200 OK` login page, so an HTML body where JSON was expected is
/// reported separately from a malformed JSON body.
fn parse_json_body<T: DeserializeOwned>(content_type: &str, text: &str) -> Result<T, RestError> {
    if content_type.contains("html") || text.trim_start().starts_with('<') {
        let content_type = if content_type.is_empty() { "an HTML body".to_string() } else { content_type.to_string() };
        return Err(RestError::NotJson { content_type });
    }
    serde_json::from_str(text).map_err(|e| RestError::JsonError(e.to_string()))
}

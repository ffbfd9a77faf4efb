use std::time::Duration;

use reconciliation_engine::events::SettlementEvent;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Could not reach the notification webhook. {0}")]
    Http(#[from] reqwest::Error),
    #[error("The notification webhook answered with status {0}")]
    Rejected(StatusCode),
}

#[derive(Serialize)]
struct Notification<'a> {
    user_id: i64,
    event: &'a str,
    payload: &'a SettlementEvent,
}

/// POSTs settlement notifications to a webhook, as `{"user_id", "event", "payload"}`.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    url: String,
}

impl Notifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }

    pub async fn notify(&self, event: &SettlementEvent) -> Result<(), NotifyError> {
        let body = Notification { user_id: event.user_id, event: event.event_name(), payload: event };
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status))
        }
    }
}

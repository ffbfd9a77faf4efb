use std::time::Duration;

use log::*;
use pay_common::Secret;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        warn!("🪛️ {key} not set, using {default} as default");
        default.to_string()
    })
}

fn secret_env(key: &str) -> Secret<String> {
    Secret::new(std::env::var(key).unwrap_or_else(|_| {
        warn!("🪛️ {key} not set. Requests that need it will be rejected by the remote service.");
        String::default()
    }))
}

/// Per-request timeout from `RECON_HTTP_TIMEOUT_SECS`, shared by all channel clients.
pub fn http_timeout_from_env() -> Duration {
    match std::env::var("RECON_HTTP_TIMEOUT_SECS").ok().map(|s| s.parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        Some(_) => {
            warn!("🪛️ RECON_HTTP_TIMEOUT_SECS is not a positive integer. Using {DEFAULT_HTTP_TIMEOUT:?}");
            DEFAULT_HTTP_TIMEOUT
        },
        None => DEFAULT_HTTP_TIMEOUT,
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub merchant: Secret<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(url: &str, merchant: &str) -> Self {
        Self { url: url.to_string(), merchant: Secret::from(merchant), timeout: DEFAULT_HTTP_TIMEOUT }
    }

    pub fn new_from_env_or_default() -> Self {
        let url = env_or("RECON_GATEWAY_URL", "https://gateway.example.com");
        let merchant = secret_env("RECON_GATEWAY_MERCHANT");
        Self { url, merchant, timeout: http_timeout_from_env() }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub url: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

impl LedgerConfig {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self { url: url.to_string(), api_key: Secret::from(api_key), timeout: DEFAULT_HTTP_TIMEOUT }
    }

    pub fn new_from_env_or_default() -> Self {
        let url = env_or("RECON_LEDGER_URL", "http://127.0.0.1:18080");
        let api_key = secret_env("RECON_LEDGER_API_KEY");
        Self { url, api_key, timeout: http_timeout_from_env() }
    }
}

#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    pub url: String,
    pub timeout: Duration,
}

impl PriceFeedConfig {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), timeout: DEFAULT_HTTP_TIMEOUT }
    }

    pub fn new_from_env_or_default() -> Self {
        let url = env_or("RECON_PRICE_FEED_URL", "https://prices.example.com");
        Self { url, timeout: http_timeout_from_env() }
    }
}

#[derive(Debug, Clone)]
pub struct BankPortalConfig {
    pub url: String,
    pub username: String,
    pub password: Secret<String>,
    pub account: String,
    pub timeout: Duration,
}

impl BankPortalConfig {
    pub fn new(url: &str, username: &str, password: &str, account: &str) -> Self {
        Self {
            url: url.to_string(),
            username: username.to_string(),
            password: Secret::from(password),
            account: account.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn new_from_env_or_default() -> Self {
        let url = env_or("RECON_BANK_URL", "https://ib.bank.example.com");
        let username = env_or("RECON_BANK_USERNAME", "");
        let password = secret_env("RECON_BANK_PASSWORD");
        let account = env_or("RECON_BANK_ACCOUNT", "");
        Self { url, username, password, account, timeout: http_timeout_from_env() }
    }
}

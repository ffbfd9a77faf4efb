use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use channel_tools::{BankPortalConfig, GatewayConfig, LedgerConfig, PriceFeedConfig};
use chrono::Duration;
use log::*;
use pay_common::helpers::parse_boolean_flag;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/reconciler.db";
const DEFAULT_DB_POOL_SIZE: u32 = 10;
const DEFAULT_GATEWAY_INTERVAL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_GATEWAY_WINDOW: Duration = Duration::hours(2);
const DEFAULT_LEDGER_INTERVAL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_ORDER_FALLBACK_AGE: Duration = Duration::hours(24);
const DEFAULT_FALLBACK_ASSET: &str = "TON";
const DEFAULT_STATEMENT_INTERVAL: StdDuration = StdDuration::from_secs(600);
const DEFAULT_STATEMENT_WINDOW: Duration = Duration::hours(24);
const DEFAULT_SESSION_BUFFER: Duration = Duration::minutes(5);
const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 3;
const DEFAULT_LOGIN_ALERT_THRESHOLD: u32 = 5;
const DEFAULT_LOGIN_BACKOFF_BASE: StdDuration = StdDuration::from_secs(2);
const DEFAULT_LOGIN_BACKOFF_CAP: StdDuration = StdDuration::from_secs(60);
const SECOND: StdDuration = StdDuration::from_secs(1);
const MINUTE: StdDuration = StdDuration::from_secs(60);
const HOUR: StdDuration = StdDuration::from_secs(3600);
/// Longest window or age a setting may ask for.
const MAX_SPAN: StdDuration = StdDuration::from_secs(366 * 24 * 3600);

#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    pub database_url: String,
    pub db_pool_size: u32,
    pub gateway: GatewayReconcilerConfig,
    pub ledger: LedgerReconcilerConfig,
    pub statement: StatementReconcilerConfig,
    pub session: SessionConfig,
    /// Cached user views are invalidated in Redis when set.
    pub redis_url: Option<String>,
    /// Settlement notifications are POSTed here when set.
    pub notify_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GatewayReconcilerConfig {
    pub enabled: bool,
    pub interval: StdDuration,
    /// Only transactions created within this window are polled. Older ones are left pending.
    pub window: Duration,
    pub api: GatewayConfig,
}

#[derive(Clone, Debug)]
pub struct LedgerReconcilerConfig {
    pub enabled: bool,
    pub interval: StdDuration,
    /// Swept balances are sent here. Sweeping is disabled when empty.
    pub custodial_address: String,
    /// How far back the by-order fallback scan looks.
    pub order_fallback_age: Duration,
    /// The asset that orders without a crypto payment record are priced in.
    pub fallback_asset: String,
    pub api: LedgerConfig,
    pub price_feed: PriceFeedConfig,
}

#[derive(Clone, Debug)]
pub struct StatementReconcilerConfig {
    pub enabled: bool,
    pub interval: StdDuration,
    /// Each run requests the statement for this window, ending now.
    pub window: Duration,
    pub portal: BankPortalConfig,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// A session this close to its expiry is replaced rather than reused.
    pub safety_buffer: Duration,
    pub max_login_attempts: u32,
    pub backoff_base: StdDuration,
    pub backoff_cap: StdDuration,
    /// Consecutive login failures at or past this count are logged at error level.
    pub alert_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            safety_buffer: DEFAULT_SESSION_BUFFER,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            backoff_base: DEFAULT_LOGIN_BACKOFF_BASE,
            backoff_cap: DEFAULT_LOGIN_BACKOFF_CAP,
            alert_threshold: DEFAULT_LOGIN_ALERT_THRESHOLD,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("RECON_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ RECON_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_pool_size = env_number("RECON_DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE);
        let gateway = GatewayReconcilerConfig {
            enabled: parse_boolean_flag(env::var("RECON_GATEWAY_ENABLED").ok(), true),
            interval: env_secs("RECON_GATEWAY_INTERVAL_SECS", DEFAULT_GATEWAY_INTERVAL),
            window: env_span("RECON_GATEWAY_WINDOW_MINS", MINUTE, DEFAULT_GATEWAY_WINDOW),
            api: GatewayConfig::new_from_env_or_default(),
        };
        let custodial_address = env::var("RECON_CUSTODIAL_ADDRESS").ok().unwrap_or_else(|| {
            warn!("🪛️ RECON_CUSTODIAL_ADDRESS is not set. Settled crypto payments will not be swept.");
            String::default()
        });
        let ledger = LedgerReconcilerConfig {
            enabled: parse_boolean_flag(env::var("RECON_LEDGER_ENABLED").ok(), true),
            interval: env_secs("RECON_LEDGER_INTERVAL_SECS", DEFAULT_LEDGER_INTERVAL),
            custodial_address,
            order_fallback_age: env_span("RECON_ORDER_FALLBACK_HOURS", HOUR, DEFAULT_ORDER_FALLBACK_AGE),
            fallback_asset: env::var("RECON_FALLBACK_ASSET").unwrap_or_else(|_| DEFAULT_FALLBACK_ASSET.to_string()),
            api: LedgerConfig::new_from_env_or_default(),
            price_feed: PriceFeedConfig::new_from_env_or_default(),
        };
        let statement = StatementReconcilerConfig {
            enabled: parse_boolean_flag(env::var("RECON_STATEMENT_ENABLED").ok(), true),
            interval: env_secs("RECON_STATEMENT_INTERVAL_SECS", DEFAULT_STATEMENT_INTERVAL),
            window: env_span("RECON_STATEMENT_WINDOW_HOURS", HOUR, DEFAULT_STATEMENT_WINDOW),
            portal: BankPortalConfig::new_from_env_or_default(),
        };
        let session = SessionConfig {
            safety_buffer: env_span("RECON_SESSION_BUFFER_SECS", SECOND, DEFAULT_SESSION_BUFFER),
            max_login_attempts: env_number("RECON_SESSION_MAX_LOGIN_ATTEMPTS", DEFAULT_MAX_LOGIN_ATTEMPTS).max(1),
            alert_threshold: env_number("RECON_SESSION_ALERT_THRESHOLD", DEFAULT_LOGIN_ALERT_THRESHOLD),
            ..SessionConfig::default()
        };
        let redis_url = optional_env("RECON_REDIS_URL");
        if redis_url.is_none() {
            info!("🪛️ RECON_REDIS_URL is not set. Cache invalidation is disabled.");
        }
        let notify_url = optional_env("RECON_NOTIFY_URL");
        if notify_url.is_none() {
            info!("🪛️ RECON_NOTIFY_URL is not set. Settlement notifications are disabled.");
        }
        Self { database_url, db_pool_size, gateway, ledger, statement, session, redis_url, notify_url }
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_number<T: FromStr + Display + Copy>(key: &str, default: T) -> T
where T::Err: Display {
    match env::var(key) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: StdDuration) -> StdDuration {
    match env_number(key, default.as_secs()) {
        0 => {
            error!("🪛️ {key} must be greater than zero. Using the default, {}s, instead.", default.as_secs());
            default
        },
        secs => StdDuration::from_secs(secs),
    }
}

/// Reads a whole number of `unit`s from `key`. Values that are not positive, or that exceed [`MAX_SPAN`], fall back to
/// `default`.
fn env_span(key: &str, unit: StdDuration, default: Duration) -> Duration {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    let span = raw
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| unit.checked_mul(n))
        .filter(|d| *d <= MAX_SPAN)
        .and_then(|d| Duration::from_std(d).ok());
    span.unwrap_or_else(|| {
        error!(
            "🪛️ {raw} is not a valid value for {key}. It must be a positive number of at most {} days. Using the \
             default, {}s, instead.",
            MAX_SPAN.as_secs() / 86_400,
            default.num_seconds()
        );
        default
    })
}

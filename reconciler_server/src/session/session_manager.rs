use std::time::Duration as StdDuration;

use channel_tools::{BankPortal, PortalSession};
use chrono::{DateTime, Duration, Utc};
use failsafe::backoff;
use log::*;
use pay_common::Secret;
use reconciliation_engine::{db_types::AuthSession, SessionStore};

use crate::{config::SessionConfig, errors::SessionError};

/// The channel key under which the banking-portal session is persisted.
pub const BANK_PORTAL_CHANNEL: &str = "bank_portal";

/// Delays between login attempts: `backoff_base`, doubling on each attempt up to `backoff_cap`.
pub fn login_delays(config: &SessionConfig) -> impl Iterator<Item = StdDuration> {
    backoff::exponential(config.backoff_base, config.backoff_cap)
}

/// A session is usable if it is not within `buffer` of its absolute expiry, and has not been idle for longer than its
/// idle budget.
pub fn session_is_valid(session: &AuthSession, now: DateTime<Utc>, buffer: Duration) -> bool {
    let before_expiry = now < session.expires_at - buffer;
    let idle = now - session.last_activity_at;
    before_expiry && idle <= Duration::seconds(session.idle_timeout_secs)
}

/// Owns the banking-portal session: reuses it while it is valid, logs in again when it isn't, and persists every new
/// session so that a restarted process can pick it up.
///
/// The manager keeps no lock around the session. It is owned by the statement reconciler, which is the only consumer.
pub struct SessionManager<P, S> {
    portal: P,
    store: S,
    username: String,
    password: Secret<String>,
    config: SessionConfig,
    current: Option<AuthSession>,
    loaded: bool,
    consecutive_failures: u32,
}

impl<P, S> SessionManager<P, S>
where
    P: BankPortal,
    S: SessionStore,
{
    pub fn new(portal: P, store: S, username: &str, password: Secret<String>, config: SessionConfig) -> Self {
        Self {
            portal,
            store,
            username: username.to_string(),
            password,
            config,
            current: None,
            loaded: false,
            consecutive_failures: 0,
        }
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn current(&self) -> Option<&AuthSession> {
        self.current.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Picks up the persisted session, if there is one. Called once before the first login.
    pub async fn load_persisted(&mut self) -> Result<(), SessionError> {
        self.loaded = true;
        match self.store.load_session(BANK_PORTAL_CHANNEL).await? {
            Some(session) => {
                debug!("🔑️ Loaded persisted portal session. Expires at {}", session.expires_at);
                self.current = Some(session);
            },
            None => debug!("🔑️ No persisted portal session found"),
        }
        Ok(())
    }

    /// Returns the current session if it is still valid, otherwise logs in and returns the new one.
    pub async fn ensure_valid(&mut self) -> Result<AuthSession, SessionError> {
        if !self.loaded {
            self.load_persisted().await?;
        }
        let now = Utc::now();
        match &self.current {
            Some(session) if session_is_valid(session, now, self.config.safety_buffer) => {
                trace!("🔑️ Reusing portal session");
                return Ok(session.clone());
            },
            Some(session) => {
                debug!(
                    "🔑️ Portal session is no longer usable (expires {}, last active {}). Logging in again.",
                    session.expires_at, session.last_activity_at
                );
            },
            None => debug!("🔑️ No portal session. Logging in."),
        }
        self.login().await
    }

    /// Discards the local and persisted session.
    pub async fn invalidate(&mut self) -> Result<(), SessionError> {
        self.current = None;
        self.store.clear_session(BANK_PORTAL_CHANNEL).await?;
        debug!("🔑️ Portal session invalidated");
        Ok(())
    }

    /// Throws away the current session, even if it looks valid, and logs in again. Used after the portal rejected a
    /// session that passed the local validity check.
    pub async fn force_login(&mut self) -> Result<AuthSession, SessionError> {
        warn!("🔑️ The portal rejected the current session. Forcing a new login.");
        self.invalidate().await?;
        self.login().await
    }

    /// Records a successful portal call, which restarts the idle clock.
    pub async fn record_activity(&mut self) {
        let now = Utc::now();
        if let Some(session) = self.current.as_mut() {
            session.last_activity_at = now;
            if let Err(e) = self.store.touch_session(BANK_PORTAL_CHANNEL, now).await {
                warn!("🔑️ Could not record session activity. {e}");
            }
        }
    }

    async fn login(&mut self) -> Result<AuthSession, SessionError> {
        let mut delays = login_delays(&self.config);
        let attempts = self.config.max_login_attempts.max(1);
        let mut last_error = String::default();
        for attempt in 1..=attempts {
            match self.portal.login(&self.username, self.password.reveal()).await {
                Ok(portal_session) => {
                    if self.consecutive_failures > 0 {
                        info!("🔑️ Portal login succeeded after {} failed attempts", self.consecutive_failures);
                    }
                    self.consecutive_failures = 0;
                    let session = to_auth_session(portal_session, Utc::now());
                    self.store.save_session(&session).await?;
                    self.current = Some(session.clone());
                    return Ok(session);
                },
                Err(e) => {
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= self.config.alert_threshold {
                        error!(
                            "🚨️ Bank portal login has failed {} times in a row. Statement reconciliation is stalled \
                             until this is resolved. Last error: {e}",
                            self.consecutive_failures
                        );
                    } else {
                        warn!("🔑️ Portal login attempt {attempt} of {attempts} failed. {e}");
                    }
                    last_error = e.to_string();
                },
            }
            if attempt < attempts {
                let delay = delays.next().unwrap_or(self.config.backoff_cap);
                debug!("🔑️ Retrying portal login in {delay:?}");
                tokio::time::sleep(delay).await;
            }
        }
        Err(SessionError::LoginFailed { attempts, last_error })
    }
}

pub fn to_portal_session(session: &AuthSession) -> PortalSession {
    PortalSession {
        session_token: session.session_token.clone(),
        csrf_token: session.csrf_token.clone(),
        cookies: session.cookies.clone(),
        expires_at: session.expires_at,
        idle_timeout_secs: session.idle_timeout_secs,
    }
}

fn to_auth_session(session: PortalSession, now: DateTime<Utc>) -> AuthSession {
    AuthSession {
        channel: BANK_PORTAL_CHANNEL.to_string(),
        session_token: session.session_token,
        csrf_token: session.csrf_token,
        cookies: session.cookies,
        expires_at: session.expires_at,
        idle_timeout_secs: session.idle_timeout_secs,
        last_activity_at: now,
        created_at: now,
    }
}

#[cfg(test)]
mod test {
    use reconciliation_engine::test_utils::prepare_env::{fresh_database, tear_down};

    use super::*;
    use crate::test::mocks::FakePortal;

    fn session_at(now: DateTime<Utc>, expires_in: Duration, idle_for: Duration, idle_budget: i64) -> AuthSession {
        AuthSession {
            channel: BANK_PORTAL_CHANNEL.into(),
            session_token: "t".into(),
            csrf_token: "c".into(),
            cookies: "SESSION=t".into(),
            expires_at: now + expires_in,
            idle_timeout_secs: idle_budget,
            last_activity_at: now - idle_for,
            created_at: now - Duration::hours(1),
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            backoff_base: StdDuration::from_millis(1),
            backoff_cap: StdDuration::from_millis(4),
            alert_threshold: 2,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn login_delays_double_up_to_the_cap() {
        let config = SessionConfig {
            backoff_base: StdDuration::from_secs(2),
            backoff_cap: StdDuration::from_secs(10),
            ..SessionConfig::default()
        };
        let delays = login_delays(&config).take(5).map(|d| d.as_secs()).collect::<Vec<_>>();
        assert_eq!(delays, vec![2, 4, 8, 10, 10]);
        // every login starts over from the base delay
        assert_eq!(login_delays(&config).next(), Some(StdDuration::from_secs(2)));
    }

    #[test]
    fn validity_uses_both_clocks() {
        let now = Utc::now();
        let buffer = Duration::minutes(5);
        assert!(session_is_valid(&session_at(now, Duration::hours(1), Duration::minutes(1), 900), now, buffer));
        // inside the safety buffer
        assert!(!session_is_valid(&session_at(now, Duration::minutes(4), Duration::zero(), 900), now, buffer));
        assert!(!session_is_valid(&session_at(now, Duration::minutes(5), Duration::zero(), 900), now, buffer));
        // idle for too long
        assert!(!session_is_valid(&session_at(now, Duration::hours(1), Duration::minutes(16), 900), now, buffer));
        assert!(session_is_valid(&session_at(now, Duration::hours(1), Duration::minutes(15), 900), now, buffer));
    }

    #[tokio::test]
    async fn reuses_valid_session_and_persists_logins() {
        let db = fresh_database().await;
        let portal = FakePortal::new();
        let mut sessions = SessionManager::new(portal.clone(), db.clone(), "merchant", "pw".into(), fast_config());
        let first = sessions.ensure_valid().await.unwrap();
        let second = sessions.ensure_valid().await.unwrap();
        assert_eq!(first.session_token, second.session_token);
        assert_eq!(portal.login_count(), 1);
        let stored = db.load_session(BANK_PORTAL_CHANNEL).await.unwrap().unwrap();
        assert_eq!(stored.session_token, first.session_token);

        // a restarted process picks up the persisted session without logging in
        let mut restarted = SessionManager::new(portal.clone(), db.clone(), "merchant", "pw".into(), fast_config());
        let resumed = restarted.ensure_valid().await.unwrap();
        assert_eq!(resumed.session_token, first.session_token);
        assert_eq!(portal.login_count(), 1);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn session_near_expiry_is_replaced() {
        let db = fresh_database().await;
        let now = Utc::now();
        db.save_session(&session_at(now, Duration::minutes(2), Duration::zero(), 900)).await.unwrap();
        let portal = FakePortal::new();
        let mut sessions = SessionManager::new(portal.clone(), db.clone(), "merchant", "pw".into(), fast_config());
        let session = sessions.ensure_valid().await.unwrap();
        assert_ne!(session.session_token, "t");
        assert_eq!(portal.login_count(), 1);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn force_login_discards_persisted_session() {
        let db = fresh_database().await;
        let portal = FakePortal::new();
        let mut sessions = SessionManager::new(portal.clone(), db.clone(), "merchant", "pw".into(), fast_config());
        let first = sessions.ensure_valid().await.unwrap();
        let second = sessions.force_login().await.unwrap();
        assert_ne!(first.session_token, second.session_token);
        assert_eq!(portal.login_count(), 2);
        let stored = db.load_session(BANK_PORTAL_CHANNEL).await.unwrap().unwrap();
        assert_eq!(stored.session_token, second.session_token);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn login_retries_with_backoff_then_gives_up() {
        let db = fresh_database().await;
        let portal = FakePortal::new();
        portal.fail_logins(10);
        let mut sessions = SessionManager::new(portal.clone(), db.clone(), "merchant", "pw".into(), fast_config());
        let err = sessions.ensure_valid().await.unwrap_err();
        assert!(matches!(err, SessionError::LoginFailed { attempts: 3, .. }));
        assert_eq!(portal.login_count(), 3);
        assert_eq!(sessions.consecutive_failures(), 3);
        assert!(sessions.current().is_none());
        assert!(db.load_session(BANK_PORTAL_CHANNEL).await.unwrap().is_none());
        tear_down(db).await;
    }

    #[tokio::test]
    async fn login_recovers_within_the_attempt_budget() {
        let db = fresh_database().await;
        let portal = FakePortal::new();
        portal.fail_logins(2);
        let mut sessions = SessionManager::new(portal.clone(), db.clone(), "merchant", "pw".into(), fast_config());
        assert!(sessions.ensure_valid().await.is_ok());
        assert_eq!(portal.login_count(), 3);
        assert_eq!(sessions.consecutive_failures(), 0);
        tear_down(db).await;
    }
}

use std::fmt::Display;

use channel_tools::{
    BankPortal,
    BankPortalApi,
    GatewayApi,
    LedgerApi,
    LedgerNode,
    PaymentGateway,
    PriceFeed,
    PriceFeedApi,
};
use futures::future::join_all;
use log::*;
use reconciliation_engine::{
    events::EventProducers,
    ReconciliationQueries,
    SessionStore,
    SettlementApi,
    SettlementDatabase,
    SqliteDatabase,
};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    config::ReconcilerConfig,
    errors::ServerError,
    reconcilers::{GatewayReconciler, LedgerReconciler, Reconciler, StatementReconciler},
    session::SessionManager,
};

/// The external services the reconcilers talk to.
pub struct Channels<G, L, F, P> {
    pub gateway: G,
    pub ledger: L,
    pub price_feed: F,
    pub bank_portal: P,
}

pub type LiveChannels = Channels<GatewayApi, LedgerApi, PriceFeedApi, BankPortalApi>;

impl LiveChannels {
    pub fn from_config(config: &ReconcilerConfig) -> Result<Self, ServerError> {
        fn init<E: Display>(e: E) -> ServerError {
            ServerError::InitializeError(format!("Could not create a channel client. {e}"))
        }
        Ok(Self {
            gateway: GatewayApi::new(config.gateway.api.clone()).map_err(init)?,
            ledger: LedgerApi::new(config.ledger.api.clone()).map_err(init)?,
            price_feed: PriceFeedApi::new(config.ledger.price_feed.clone()).map_err(init)?,
            bank_portal: BankPortalApi::new(&config.statement.portal).map_err(init)?,
        })
    }
}

pub type LiveEngine = ReconciliationEngine<SqliteDatabase, GatewayApi, LedgerApi, PriceFeedApi, BankPortalApi>;

/// Owns the reconciler workers. [`ReconciliationEngine::start`] spawns one task per enabled reconciler, and
/// [`ReconciliationEngine::stop`] lets any cycle in flight run to completion before the tasks exit.
pub struct ReconciliationEngine<B, G, L, F, P> {
    config: ReconcilerConfig,
    db: B,
    channels: Option<Channels<G, L, F, P>>,
    producers: EventProducers,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<B, G, L, F, P> ReconciliationEngine<B, G, L, F, P>
where
    B: SettlementDatabase + ReconciliationQueries + SessionStore + 'static,
    G: PaymentGateway + 'static,
    L: LedgerNode + Clone + 'static,
    F: PriceFeed + 'static,
    P: BankPortal + 'static,
{
    pub fn new(config: ReconcilerConfig, db: B, channels: Channels<G, L, F, P>, producers: EventProducers) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { config, db, channels: Some(channels), producers, shutdown, tasks: Vec::new() }
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Spawns the enabled reconcilers and returns immediately. An engine can only be started once.
    pub fn start(&mut self) -> Result<usize, ServerError> {
        let Some(channels) = self.channels.take() else {
            return Err(ServerError::InitializeError("The reconciliation engine has already been started".into()));
        };
        let Channels { gateway, ledger, price_feed, bank_portal } = channels;
        if self.config.gateway.enabled {
            let reconciler = GatewayReconciler::new(self.settlement_api(), gateway, self.config.gateway.clone());
            self.spawn(reconciler);
        } else {
            info!("🪛️ Gateway reconciliation is disabled");
        }
        if self.config.ledger.enabled {
            let reconciler =
                LedgerReconciler::new(self.settlement_api(), ledger, price_feed, self.config.ledger.clone());
            self.spawn(reconciler);
        } else {
            info!("🪛️ Ledger reconciliation is disabled");
        }
        if self.config.statement.enabled {
            let portal = &self.config.statement.portal;
            let sessions = SessionManager::new(
                bank_portal,
                self.db.clone(),
                &portal.username,
                portal.password.clone(),
                self.config.session.clone(),
            );
            let reconciler = StatementReconciler::new(self.settlement_api(), sessions, self.config.statement.clone());
            self.spawn(reconciler);
        } else {
            info!("🪛️ Statement reconciliation is disabled");
        }
        if self.tasks.is_empty() {
            warn!("🚦️ Every reconciler is disabled. The engine has nothing to do.");
        }
        Ok(self.tasks.len())
    }

    /// Signals every worker to stop and waits for them to exit.
    pub async fn stop(&mut self) {
        if self.shutdown.send(true).is_err() {
            debug!("🚦️ No reconcilers are listening for the shutdown signal");
        }
        let tasks = std::mem::take(&mut self.tasks);
        info!("🚦️ Waiting for {} reconcilers to stop", tasks.len());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("🚦️ A reconciler task did not shut down cleanly. {e}");
            }
        }
        info!("🚦️ Reconciliation engine stopped");
    }

    fn settlement_api(&self) -> SettlementApi<B> {
        SettlementApi::new(self.db.clone(), self.producers.clone())
    }

    fn spawn<R: Reconciler>(&mut self, reconciler: R) {
        let shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(run_loop(reconciler, shutdown)));
    }
}

/// Runs `reconciler` every interval until shutdown is signalled. A run that fails as a whole is logged, and the next
/// tick tries again.
async fn run_loop<R: Reconciler>(mut reconciler: R, mut shutdown: watch::Receiver<bool>) {
    let name = reconciler.name();
    let mut timer = tokio::time::interval(reconciler.interval());
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("🚦️ {name} reconciler started. Running every {:?}", reconciler.interval());
    loop {
        tokio::select! {
            _ = timer.tick() => {
                debug!("🚦️ Starting {name} reconciliation run");
                if let Err(e) = reconciler.run_once().await {
                    error!("🚦️ The {name} reconciliation run was abandoned. {e}");
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    reconciler.finish().await;
    info!("🚦️ {name} reconciler stopped");
}

#[cfg(test)]
mod test {
    use std::time::Duration as StdDuration;

    use channel_tools::{BankPortalConfig, GatewayConfig, LedgerConfig, PriceFeedConfig};
    use chrono::{Duration, Utc};
    use pay_common::Rial;
    use reconciliation_engine::{
        db_types::TransactionStatus,
        test_utils::prepare_env::{fresh_database, tear_down},
    };

    use super::*;
    use crate::{
        config::{GatewayReconcilerConfig, LedgerReconcilerConfig, SessionConfig, StatementReconcilerConfig},
        test::{
            fixtures::{gateway_order, new_user},
            mocks::{FakeGateway, FakeLedger, FakePortal, FakePriceFeed},
        },
    };

    fn test_config(gateway: bool, ledger: bool, statement: bool) -> ReconcilerConfig {
        let interval = StdDuration::from_millis(50);
        ReconcilerConfig {
            database_url: String::default(),
            db_pool_size: 1,
            gateway: GatewayReconcilerConfig {
                enabled: gateway,
                interval,
                window: Duration::hours(2),
                api: GatewayConfig::new("http://localhost", "m"),
            },
            ledger: LedgerReconcilerConfig {
                enabled: ledger,
                interval,
                custodial_address: String::default(),
                order_fallback_age: Duration::hours(24),
                fallback_asset: "TON".into(),
                api: LedgerConfig::new("http://localhost", "k"),
                price_feed: PriceFeedConfig::new("http://localhost"),
            },
            statement: StatementReconcilerConfig {
                enabled: statement,
                interval,
                window: Duration::hours(24),
                portal: BankPortalConfig::new("http://localhost", "merchant", "pw", "0101"),
            },
            session: SessionConfig::default(),
            redis_url: None,
            notify_url: None,
        }
    }

    type FakeChannels = Channels<FakeGateway, FakeLedger, FakePriceFeed, FakePortal>;

    fn fake_channels(gateway: FakeGateway, portal: FakePortal) -> FakeChannels {
        Channels { gateway, ledger: FakeLedger::new(), price_feed: FakePriceFeed::default(), bank_portal: portal }
    }

    #[tokio::test]
    async fn engine_settles_in_the_background_and_stops() {
        let db = fresh_database().await;
        let user = new_user(&db, "alice").await;
        gateway_order(&db, user, "OS900001", 250_000, "TRK-ENGINE", Utc::now()).await;
        let gateway = FakeGateway::new();
        gateway.verify_succeeds("TRK-ENGINE", Rial::from(250_000), "991");
        let portal = FakePortal::new();
        let channels = fake_channels(gateway, portal.clone());
        let mut engine = ReconciliationEngine::new(
            test_config(true, true, true),
            db.clone(),
            channels,
            EventProducers::default(),
        );
        assert_eq!(engine.start().unwrap(), 3);
        assert!(engine.is_running());

        let mut settled = false;
        for _ in 0..100 {
            let tx = db.fetch_transaction_by_track_id("TRK-ENGINE").await.unwrap().unwrap();
            if tx.status == TransactionStatus::Completed && portal.statement_calls() > 0 {
                settled = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert!(settled);

        engine.stop().await;
        assert!(!engine.is_running());
        // the statement worker logged in once and reused its session
        assert_eq!(portal.login_count(), 1);
        let calls = portal.statement_calls();
        tokio::time::sleep(StdDuration::from_millis(120)).await;
        assert_eq!(portal.statement_calls(), calls);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn disabled_reconcilers_are_not_started() {
        let db = fresh_database().await;
        let portal = FakePortal::new();
        let channels = fake_channels(FakeGateway::new(), portal.clone());
        let config = test_config(false, false, false);
        let mut engine = ReconciliationEngine::new(config, db.clone(), channels, EventProducers::default());
        assert_eq!(engine.start().unwrap(), 0);
        assert!(engine.start().is_err());
        engine.stop().await;
        assert_eq!(portal.login_count(), 0);
        tear_down(db).await;
    }
}

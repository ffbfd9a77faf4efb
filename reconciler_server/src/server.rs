use log::*;
use reconciliation_engine::SqliteDatabase;

use crate::{
    config::ReconcilerConfig,
    engine::{LiveChannels, LiveEngine},
    errors::ServerError,
    integrations::create_event_handlers,
};

/// Opens the database, starts the reconcilers and runs until the process receives Ctrl-C.
pub async fn run_reconciler(config: ReconcilerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.db_pool_size)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not open {}. {e}", config.database_url)))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Database migration failed. {e}")))?;
    let handlers = create_event_handlers(&config)?;
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let channels = LiveChannels::from_config(&config)?;
    let mut engine = LiveEngine::new(config, db, channels, producers);
    let count = engine.start()?;
    info!("🚀️ Reconciliation engine running with {count} reconcilers. Press Ctrl-C to stop.");
    let signal = tokio::signal::ctrl_c().await;
    if let Err(e) = &signal {
        error!("🚀️ Could not listen for the shutdown signal. Stopping now. {e}");
    }
    info!("🚀️ Shutting down");
    engine.stop().await;
    signal.map_err(ServerError::from)
}

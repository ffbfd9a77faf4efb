use std::collections::HashMap;

use cucumber::World;
use log::*;
use reconciliation_engine::{
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path, tear_down},
    SettleOutcome,
    SettlementApi,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct ReconWorld {
    pub system: Option<SettlementSystem>,
}

#[derive(Debug)]
pub struct SettlementSystem {
    pub db_path: String,
    pub api: SettlementApi<SqliteDatabase>,
    pub users: HashMap<String, i64>,
    pub last_outcome: Option<SettleOutcome>,
}

impl ReconWorld {
    pub fn system(&mut self) -> &mut SettlementSystem {
        self.system.as_mut().expect("Settlement system not initialised")
    }

    pub fn db(&mut self) -> &SqliteDatabase {
        self.system().api.db()
    }

    pub fn user(&mut self, name: &str) -> i64 {
        *self.system().users.get(name).unwrap_or_else(|| panic!("No user called '{name}'"))
    }
}

impl SettlementSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let api = SettlementApi::new(db, EventProducers::default());
        Self { db_path: url, api, users: HashMap::new(), last_outcome: None }
    }

    /// Removes the scenario database. A failed scenario keeps its database for inspection.
    pub async fn finish(self, passed: bool) {
        if passed {
            trace!("🚀️ Removing scenario database {}", self.db_path);
            tear_down(self.api.db().clone()).await;
        } else {
            error!("🚀️ Scenario failed. Its database is kept at {}", self.db_path);
        }
    }
}

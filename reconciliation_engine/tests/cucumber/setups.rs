use cucumber::given;
use reconciliation_engine::{db_types::NewPayerAccount, PaymentIntake};

use crate::cucumber::{recon_world::SettlementSystem, ReconWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut ReconWorld) {
    let system = SettlementSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a user '{word}'")]
async fn a_user(world: &mut ReconWorld, name: String) {
    let id = world.db().create_user(&name).await.expect("Error creating user");
    world.system().users.insert(name, id);
}

#[given(expr = "a user '{word}' with IBAN {string}")]
async fn a_user_with_iban(world: &mut ReconWorld, name: String, iban: String) {
    a_user(world, name.clone()).await;
    let user_id = world.user(&name);
    let payer = NewPayerAccount::new(user_id).with_iban(iban);
    world.db().register_payer(payer).await.expect("Error registering payer");
}

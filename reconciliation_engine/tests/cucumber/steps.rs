use chrono::Utc;
use cucumber::{given, then, when};
use reconciliation_engine::{
    db_types::{NewOrder, NewTransaction, OrderNumber, OrderRef, OrderStatusType, PaymentMethod, PaymentType, Rial},
    helpers::extract_payer,
    traits::StatementCredit,
    PaymentIntake,
    ReconciliationQueries,
    SettleOutcome,
    SettlementFacts,
};

use crate::cucumber::ReconWorld;

#[given(expr = "'{word}' placed order {word} for {int} Rial paid by gateway with track id {word}")]
async fn gateway_order(world: &mut ReconWorld, name: String, order_number: String, amount: i64, track_id: String) {
    let user_id = world.user(&name);
    let number = OrderNumber::from(order_number.as_str());
    let order = NewOrder::new(number, user_id, Rial::from(amount), PaymentMethod::Gateway);
    world.db().insert_order(order).await.expect("Error inserting order");
    let tx = NewTransaction::new(track_id, order_number, user_id, Rial::from(amount), PaymentType::Gateway);
    world.db().insert_transaction(tx).await.expect("Error inserting transaction");
}

#[given(expr = "'{word}' started a wallet charge for {int} Rial with track id {word}")]
async fn wallet_charge(world: &mut ReconWorld, name: String, amount: i64, track_id: String) {
    let user_id = world.user(&name);
    let tag = OrderRef::wallet_charge_tag(user_id, Utc::now());
    let tx = NewTransaction::new(track_id, tag, user_id, Rial::from(amount), PaymentType::Gateway);
    world.db().insert_transaction(tx).await.expect("Error inserting transaction");
}

#[when(expr = "the gateway verifies track id {word} for {int} Rial with reference {word}")]
async fn gateway_verifies(world: &mut ReconWorld, track_id: String, amount: i64, reference: String) {
    let facts = SettlementFacts::new(Utc::now()).with_amount(Rial::from(amount)).with_ref_number(reference);
    let outcome = world.system().api.settle_transaction(&track_id, &facts).await.expect("Error settling transaction");
    world.system().last_outcome = Some(outcome);
}

#[when(expr = "statement line {word} credits {int} Rial with description {string}")]
async fn statement_line(world: &mut ReconWorld, serial: String, amount: i64, description: String) {
    let hints = extract_payer(&description);
    let payer = world.db().find_payer(&hints).await.expect("Error resolving payer").expect("Payer not registered");
    let amount = Rial::from(amount);
    let credit = StatementCredit { user_id: payer.user_id, serial, amount, paid_at: Utc::now(), description };
    let outcome = world.system().api.record_statement_credit(&credit).await.expect("Error recording credit");
    world.system().last_outcome = Some(outcome);
}

#[then("the settlement is applied")]
async fn settlement_applied(world: &mut ReconWorld) {
    let outcome = world.system().last_outcome.take().expect("No settlement was attempted");
    assert!(outcome.is_settled(), "Expected a settlement, got {outcome:?}");
}

#[then("the settlement is reported as already applied")]
async fn already_applied(world: &mut ReconWorld) {
    let outcome = world.system().last_outcome.take().expect("No settlement was attempted");
    assert!(matches!(outcome, SettleOutcome::AlreadySettled), "Expected a duplicate, got {outcome:?}");
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut ReconWorld, order_number: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let order = world
        .db()
        .fetch_order_by_number(&OrderNumber::from(order_number.as_str()))
        .await
        .expect("Error fetching order")
        .expect("Order not found");
    assert_eq!(order.status, expected);
}

#[then(expr = "transaction {word} is {word}")]
async fn transaction_status(world: &mut ReconWorld, track_id: String, status: String) {
    let tx = world
        .db()
        .fetch_transaction_by_track_id(&track_id)
        .await
        .expect("Error fetching transaction")
        .expect("Transaction not found");
    assert_eq!(tx.status.to_string(), status);
}

#[then(expr = "the wallet of '{word}' holds {int} Rial")]
async fn wallet_balance(world: &mut ReconWorld, name: String, amount: i64) {
    let user_id = world.user(&name);
    let balance = world.db().fetch_wallet(user_id).await.expect("Error fetching wallet").map(|w| w.balance);
    assert_eq!(balance.unwrap_or_default(), Rial::from(amount));
}

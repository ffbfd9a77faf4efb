mod cucumber;

use ::cucumber::{codegen::LocalBoxFuture, event::ScenarioFinished, gherkin, writer, World};
use futures_util::FutureExt;
use log::*;

use crate::cucumber::ReconWorld;

#[tokio::main]
async fn main() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    ReconWorld::cucumber()
        .with_writer(writer::Libtest::or_basic())
        .after(|_feature, _rule, scenario, finished, world| clean_up(scenario, finished, world))
        .run("tests/features")
        .await;
    info!("🚀️ Settlement features complete");
}

fn clean_up<'a>(
    scenario: &'a gherkin::Scenario,
    finished: &'a ScenarioFinished,
    world: Option<&'a mut ReconWorld>,
) -> LocalBoxFuture<'a, ()> {
    let passed = matches!(finished, ScenarioFinished::StepPassed);
    async move {
        match world.and_then(|w| w.system.take()) {
            Some(system) => system.finish(passed).await,
            None => warn!("🚀️ Scenario \"{}\" did not set up a settlement system", scenario.name),
        }
    }
    .boxed_local()
}

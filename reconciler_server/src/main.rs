use dotenvy::dotenv;
use log::info;
use reconciler_server::{cli::handle_command_line_args, config::ReconcilerConfig, server::run_reconciler};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = ReconcilerConfig::from_env_or_default();
    info!("🚀️ Starting reconciler against {}", config.database_url);
    match run_reconciler(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

use std::{env, env::VarError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The reconciler is configured entirely through the environment. Any argument other than `--version` prints the help
/// text. Returns true when the process should exit instead of starting.
pub fn handle_command_line_args() -> bool {
    let args = env::args().skip(1).collect::<Vec<String>>();
    if args.is_empty() {
        return false;
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("reconciler_server {VERSION}");
    } else {
        display_readme();
        display_envs();
    }
    true
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Never add secrets (merchant id, API key, bank password) to this list
    const DISPLAY_ENVS: [&str; 21] = [
        "RUST_LOG",
        "RECON_DATABASE_URL",
        "RECON_DB_POOL_SIZE",
        "RECON_GATEWAY_ENABLED",
        "RECON_GATEWAY_URL",
        "RECON_GATEWAY_INTERVAL_SECS",
        "RECON_GATEWAY_WINDOW_MINS",
        "RECON_LEDGER_ENABLED",
        "RECON_LEDGER_URL",
        "RECON_LEDGER_INTERVAL_SECS",
        "RECON_CUSTODIAL_ADDRESS",
        "RECON_PRICE_FEED_URL",
        "RECON_ORDER_FALLBACK_HOURS",
        "RECON_STATEMENT_ENABLED",
        "RECON_BANK_URL",
        "RECON_BANK_USERNAME",
        "RECON_BANK_ACCOUNT",
        "RECON_STATEMENT_INTERVAL_SECS",
        "RECON_STATEMENT_WINDOW_HOURS",
        "RECON_REDIS_URL",
        "RECON_NOTIFY_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}

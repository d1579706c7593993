//! autotap CLI
//!
//! Usage from workspace root:
//!   cargo run --bin autotap -- find --tree dialog.json --target OK
//!   cargo run --bin autotap -- run --tree dialog.json --target OK --duration-secs 5
//!   cargo run --bin autotap -- --log-level debug run --tree dialog.json --target OK

use crate::cli::{Cli, Commands};
use clap::Parser;

mod cli;
mod commands;

fn init_logging(log_level: Option<&str>) {
    // Priority: --log-level > RUST_LOG env > AUTOTAP_LOG_LEVEL env > "info" default
    let log_level = log_level
        .map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .or_else(|| std::env::var("AUTOTAP_LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Find(cmd) => cmd.execute().await,
        Commands::Run(cmd) => cmd.execute().await,
    }
}

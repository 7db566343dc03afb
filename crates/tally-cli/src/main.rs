//! Tally CLI - host a pairing session or push transactions to one
//!
//! The `serve` command is the host side of a sync round: it shows the PIN,
//! waits for a device, and walks the operator through conflict resolution.
//! The `push` command is the remote side.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(error) = run(Cli::parse()).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve { port } => commands::serve::run_serve(port, cli.db_path.as_deref()).await,
        Commands::Status { url } => commands::status::run_status(&url).await,
        Commands::Push {
            url,
            pin,
            file,
            device_name,
        } => commands::push::run_push(&url, &pin, &file, &device_name).await,
        Commands::Accounts { json } => commands::ledger::run_accounts(cli.db_path.as_deref(), json),
        Commands::AddAccount { name, balance } => {
            commands::ledger::run_add_account(cli.db_path.as_deref(), &name, balance)
        }
        Commands::Items { json } => commands::ledger::run_items(cli.db_path.as_deref(), json),
        Commands::AddItem { name, brand } => {
            commands::ledger::run_add_item(cli.db_path.as_deref(), &name, brand.as_deref())
        }
        Commands::Transactions { limit, json } => {
            commands::ledger::run_transactions(cli.db_path.as_deref(), limit, json)
        }
    }
}

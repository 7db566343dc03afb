use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Track accounts and transactions, sync between devices over the LAN")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local ledger database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host a pairing session and review incoming syncs interactively
    Serve {
        /// Port to listen on (0 picks an ephemeral port)
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Query a running sync endpoint for its status
    Status {
        /// Endpoint base URL, e.g. http://192.168.1.20:8080
        #[arg(long)]
        url: String,
    },
    /// Act as the remote device: pair with a PIN and upload transactions
    Push {
        /// Endpoint base URL shown next to the host's PIN
        #[arg(long)]
        url: String,
        /// Six-digit PIN shown on the host device
        #[arg(long)]
        pin: String,
        /// JSON file holding the transactions to upload
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,
        /// Name this device reports to the host
        #[arg(long, default_value = "tally-cli")]
        device_name: String,
    },
    /// List accounts
    Accounts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an account
    AddAccount {
        /// Account name
        name: String,
        /// Opening balance
        #[arg(long, default_value = "0")]
        balance: f64,
    },
    /// List catalog items
    Items {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a catalog item
    AddItem {
        /// Item name
        name: String,
        /// Optional brand
        #[arg(long)]
        brand: Option<String>,
    },
    /// List recent transactions
    Transactions {
        /// Number of transactions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

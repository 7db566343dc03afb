use std::io;

use thiserror::Error;

use tally_core::sync::client::ClientError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Could not determine a data directory for the ledger; pass --db-path")]
    NoDataDir,
    #[error("Push file contains no transactions")]
    EmptyPushFile,
    #[error("Prompt failed: {0}")]
    Prompt(String),
}

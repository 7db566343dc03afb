//! Remote-device side of a sync round

use std::fs;
use std::path::Path;

use tally_core::models::{SyncDataPayload, Transaction};
use tally_core::sync::client::SyncClient;

use crate::error::CliError;

pub async fn run_push(
    url: &str,
    pin: &str,
    file: &Path,
    device_name: &str,
) -> Result<(), CliError> {
    let raw = fs::read_to_string(file)?;
    let transactions: Vec<Transaction> = serde_json::from_str(&raw)?;
    if transactions.is_empty() {
        return Err(CliError::EmptyPushFile);
    }

    let client = SyncClient::new(url)?;
    let paired = client.pair(pin, device_name).await?;
    println!(
        "Paired with host ({} seconds left in the session)",
        paired.expires_in
    );

    let payload = SyncDataPayload {
        transactions,
        device_name: device_name.to_string(),
        timestamp: u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0),
    };
    let response = client.push(&paired.token, &payload).await?;

    println!("{}", response.message);
    if response.pending_approval {
        println!(
            "{} conflict(s) need review on the host device:",
            response.conflicts.len()
        );
        for conflict in &response.conflicts {
            println!("  - {}", conflict.description);
        }
    }
    Ok(())
}

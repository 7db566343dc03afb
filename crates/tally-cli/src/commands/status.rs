//! Query a running sync endpoint

use tally_core::sync::client::SyncClient;

use crate::error::CliError;

pub async fn run_status(url: &str) -> Result<(), CliError> {
    let client = SyncClient::new(url)?;
    let status = client.status().await?;

    println!("running:           {}", status.running);
    println!("active sessions:   {}", status.active_sessions);
    println!("pending approvals: {}", status.pending_approvals);
    println!("port:              {}", status.port);
    Ok(())
}

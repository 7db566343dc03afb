//! Host side of a sync round: pairing window plus interactive review
//!
//! Terminal counterpart of the desktop approval screen: when a batch
//! arrives with conflicts, the operator is walked through one resolution
//! per conflict before anything touches the ledger.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tally_api::SyncServer;
use tally_core::config::SyncSettings;
use tally_core::models::{ConflictResolution, ConflictType, PendingSyncData};
use tally_core::sync::SyncEngine;

use crate::commands::ledger::open_ledger;
use crate::error::CliError;

pub async fn run_serve(port: u16, db_path: Option<&Path>) -> Result<(), CliError> {
    let ledger = open_ledger(db_path)?;
    let settings = SyncSettings::from_env()?;
    let engine = Arc::new(SyncEngine::new(ledger, settings));
    let server = SyncServer::new(engine.clone());

    let started = server.start(port).await?;
    println!("Pairing PIN:  {}", started.pin);
    println!("Connect URL:  {}", started.url);
    println!("Expires in:   {} min", started.expires_in / 60);
    println!("Waiting for a device; press Ctrl-C to stop.");

    let mut reviewed: HashSet<String> = HashSet::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping.");
                break;
            }
            _ = ticker.tick() => {
                for entry in engine.list_pending() {
                    if reviewed.insert(entry.id.clone()) {
                        review(&engine, &entry).await?;
                    }
                }
                if engine.remaining_ms() == 0 && engine.list_pending().is_empty() {
                    println!("Pairing window closed.");
                    break;
                }
            }
        }
    }

    server.stop();
    Ok(())
}

async fn review(engine: &Arc<SyncEngine>, entry: &PendingSyncData) -> Result<(), CliError> {
    println!();
    println!(
        "Incoming sync from '{}': {} transactions, {} conflict(s)",
        entry.device_name,
        entry.payload.transactions.len(),
        entry.conflicts.len()
    );
    for conflict in &entry.conflicts {
        println!("  - {}", conflict.description);
        if let Some(suggestion) = &conflict.suggestion {
            println!("    hint: {suggestion}");
        }
    }

    loop {
        let answer = prompt("Approve this sync? [y]es / [r]eject / [l]ater:").await?;
        match answer.to_lowercase().as_str() {
            "y" | "yes" => {
                let resolutions = collect_resolutions(entry).await?;
                match engine.resolve(&entry.id, true, &resolutions) {
                    Ok(result) => println!("{}", result.message),
                    Err(error) => println!("Merge failed: {error}"),
                }
                return Ok(());
            }
            "r" | "reject" => {
                let result = engine.resolve(&entry.id, false, &HashMap::new())?;
                println!("{}", result.message);
                return Ok(());
            }
            "l" | "later" => {
                println!("Left pending; it is discarded if the process restarts.");
                return Ok(());
            }
            _ => {}
        }
    }
}

async fn collect_resolutions(
    entry: &PendingSyncData,
) -> Result<HashMap<String, ConflictResolution>, CliError> {
    let mut resolutions = HashMap::new();

    for conflict in &entry.conflicts {
        let resolution = match &conflict.conflict_type {
            ConflictType::InsufficientBalance {
                current_balance,
                required,
                ..
            } => loop {
                let answer = prompt(&format!(
                    "Needs {required:.2}, balance is {current_balance:.2}. [s]kip or [a]djust amount:"
                ))
                .await?;
                match answer.to_lowercase().as_str() {
                    "s" | "skip" => break ConflictResolution::SkipTransaction,
                    "a" | "adjust" => {
                        let raw = prompt("New amount:").await?;
                        match raw.parse::<f64>() {
                            Ok(amount) if amount > 0.0 && amount.is_finite() => {
                                break ConflictResolution::AdjustAmount { new_amount: amount }
                            }
                            _ => println!("Enter a positive number."),
                        }
                    }
                    _ => {}
                }
            },
            ConflictType::UnknownItem {
                item_name,
                suggested_matches,
            } => {
                if !suggested_matches.is_empty() {
                    println!("Matches for '{item_name}':");
                    for (index, candidate) in suggested_matches.iter().enumerate() {
                        println!(
                            "  {}) {} ({:.0}% match)",
                            index + 1,
                            candidate.name,
                            f64::from(candidate.similarity_score) * 100.0
                        );
                    }
                }
                loop {
                    let answer = prompt(&format!(
                        "Item '{item_name}': [s]kip, [c]reate new, or match number:"
                    ))
                    .await?;
                    match answer.to_lowercase().as_str() {
                        "s" | "skip" => break ConflictResolution::SkipTransaction,
                        "c" | "create" => break ConflictResolution::CreateNewItem,
                        raw => {
                            let candidate = raw
                                .parse::<usize>()
                                .ok()
                                .and_then(|index| index.checked_sub(1))
                                .and_then(|index| suggested_matches.get(index));
                            if let Some(candidate) = candidate {
                                break ConflictResolution::MapItem {
                                    item_id: candidate.item_id.clone(),
                                };
                            }
                            println!("Pick a listed number, 's', or 'c'.");
                        }
                    }
                }
            }
            ConflictType::DuplicateTransaction | ConflictType::InvalidAccount => {
                println!("{} -- skipping.", conflict.description);
                ConflictResolution::SkipTransaction
            }
        };
        resolutions.insert(conflict.transaction_id.clone(), resolution);
    }

    Ok(resolutions)
}

/// Blocking stdin read off the async runtime
async fn prompt(question: &str) -> Result<String, CliError> {
    let question = question.to_string();
    tokio::task::spawn_blocking(move || {
        print!("{question} ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok::<_, io::Error>(line.trim().to_string())
    })
    .await
    .map_err(|error| CliError::Prompt(error.to_string()))?
    .map_err(CliError::Io)
}

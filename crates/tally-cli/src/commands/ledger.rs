//! Local ledger inspection and seeding

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use tally_core::db::{Ledger, SqliteLedger};

use crate::error::CliError;

/// Open the ledger at the given or default path, creating it if needed
pub fn open_ledger(db_path: Option<&Path>) -> Result<Arc<SqliteLedger>, CliError> {
    let path = match db_path {
        Some(path) => path.to_path_buf(),
        None => default_db_path()?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SqliteLedger::open(path)?))
}

fn default_db_path() -> Result<PathBuf, CliError> {
    let base = dirs::data_dir().ok_or(CliError::NoDataDir)?;
    Ok(base.join("tally").join("ledger.db"))
}

pub fn run_accounts(db_path: Option<&Path>, as_json: bool) -> Result<(), CliError> {
    let ledger = open_ledger(db_path)?;
    let accounts = ledger.list_accounts()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts yet. Create one with `tally add-account`.");
        return Ok(());
    }
    for account in accounts {
        println!("{:<36}  {:>12.2}  {}", account.id, account.balance, account.name);
    }
    Ok(())
}

pub fn run_add_account(db_path: Option<&Path>, name: &str, balance: f64) -> Result<(), CliError> {
    let ledger = open_ledger(db_path)?;
    let account = ledger.create_account(name.trim(), balance)?;
    println!("Created account '{}' ({})", account.name, account.id);
    Ok(())
}

pub fn run_items(db_path: Option<&Path>, as_json: bool) -> Result<(), CliError> {
    let ledger = open_ledger(db_path)?;
    let items = ledger.list_items()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items yet. Create one with `tally add-item`.");
        return Ok(());
    }
    for item in items {
        let brand = item.brand.as_deref().unwrap_or("-");
        println!("{:<36}  {:<24}  {}", item.id, item.name, brand);
    }
    Ok(())
}

pub fn run_add_item(
    db_path: Option<&Path>,
    name: &str,
    brand: Option<&str>,
) -> Result<(), CliError> {
    let ledger = open_ledger(db_path)?;
    let item = ledger.create_item(name.trim(), brand)?;
    println!("Created item '{}' ({})", item.name, item.id);
    Ok(())
}

pub fn run_transactions(
    db_path: Option<&Path>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let ledger = open_ledger(db_path)?;
    let transactions = ledger.list_transactions(limit)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }

    if transactions.is_empty() {
        println!("No transactions recorded.");
        return Ok(());
    }
    for tx in transactions {
        println!(
            "{}  {:>10.2}  {}",
            format_date(tx.date),
            tx.amount,
            tx.details
        );
    }
    Ok(())
}

fn format_date(unix_ms: u64) -> String {
    i64::try_from(unix_ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map_or_else(|| "-".to_string(), |dt| dt.format("%Y-%m-%d").to_string())
}

//! Ledger trait and its `SQLite` implementation

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{
    Account, Item, Transaction, TransactionItemRef, TransactionKey, TransactionType,
};
use crate::util::now_ms;

use super::migrations;

/// Consistent point-in-time view of the ledger used for conflict detection
///
/// Built under the connection lock, so a concurrent merge can never produce
/// a half-updated view.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    accounts: HashMap<String, Account>,
    items: Vec<Item>,
    existing_keys: HashSet<TransactionKey>,
}

impl LedgerSnapshot {
    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item_by_id(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Case-insensitive exact name lookup
    pub fn item_by_name(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_key(&self, key: &TransactionKey) -> bool {
        self.existing_keys.contains(key)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        accounts: Vec<Account>,
        items: Vec<Item>,
        existing: Vec<TransactionKey>,
    ) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| (account.id.clone(), account))
                .collect(),
            items,
            existing_keys: existing.into_iter().collect(),
        }
    }
}

/// Everything one approved (or conflict-free) batch writes to the ledger
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// Catalog items to create before the transactions that reference them
    pub new_items: Vec<Item>,
    /// Transactions to insert, in payload order
    pub transactions: Vec<Transaction>,
}

/// Counts reported back after a successful merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: usize,
    pub items_created: usize,
}

/// Storage operations the sync core needs from the ledger
pub trait Ledger: Send + Sync {
    /// Read a consistent snapshot for conflict classification
    fn snapshot(&self) -> Result<LedgerSnapshot>;

    /// Apply a merge plan as one atomic unit: every write succeeds or none do
    fn apply_merge(&self, plan: &MergePlan) -> Result<MergeOutcome>;

    fn list_accounts(&self) -> Result<Vec<Account>>;

    fn list_items(&self) -> Result<Vec<Item>>;

    /// List transactions, newest first
    fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>>;

    fn create_account(&self, name: &str, balance: f64) -> Result<Account>;

    fn create_item(&self, name: &str, brand: Option<&str>) -> Result<Item>;
}

/// `SQLite` implementation of [`Ledger`]
///
/// The connection mutex doubles as the exclusive ledger lock: a resolve
/// cannot interleave its writes with another in-progress merge.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open a ledger at the given path, creating and migrating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory ledger (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another merge panicked mid-write; the
        // transaction it held has already rolled back, so the data is safe.
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn parse_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
        Ok(Account {
            id: row.get(0)?,
            name: row.get(1)?,
            balance: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
        Ok(Item {
            id: row.get(0)?,
            name: row.get(1)?,
            brand: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn parse_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
        let kind: String = row.get(6)?;
        let kind = match kind.as_str() {
            "income" => TransactionType::Income,
            "expense" => TransactionType::Expense,
            "transfer" => TransactionType::Transfer,
            other => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    format!("unknown transaction kind: {other}").into(),
                ))
            }
        };

        let items: Option<String> = row.get(11)?;
        let items: Option<Vec<TransactionItemRef>> = match items {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    11,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?),
            None => None,
        };

        Ok(Transaction {
            id: row.get(0)?,
            amount: row.get(1)?,
            date: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            details: row.get(5)?,
            kind,
            affects_balance: row.get::<_, i32>(7)? != 0,
            account_id: row.get(8)?,
            category: row.get(9)?,
            store_name: row.get(10)?,
            items,
        })
    }

    fn insert_transaction(tx: &rusqlite::Transaction<'_>, record: &Transaction) -> Result<()> {
        let account_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)",
            params![record.account_id],
            |row| row.get::<_, i32>(0).map(|flag| flag != 0),
        )?;
        if !account_exists {
            return Err(Error::Validation(format!(
                "account '{}' does not exist",
                record.account_id
            )));
        }

        let items = record
            .items
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO transactions
                (id, amount, date, created_at, updated_at, details, kind,
                 affects_balance, account_id, category, store_name, items)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.amount,
                record.date,
                record.created_at,
                record.updated_at,
                record.details,
                kind_str(record.kind),
                i32::from(record.affects_balance),
                record.account_id,
                record.category,
                record.store_name,
                items,
            ],
        )?;

        if record.affects_balance {
            let delta = if record.is_income() {
                record.amount
            } else {
                -record.amount
            };
            tx.execute(
                "UPDATE accounts SET balance = balance + ?, updated_at = ? WHERE id = ?",
                params![delta, now_ms(), record.account_id],
            )?;
        }

        Ok(())
    }
}

const fn kind_str(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Income => "income",
        TransactionType::Expense => "expense",
        TransactionType::Transfer => "transfer",
    }
}

impl Ledger for SqliteLedger {
    fn snapshot(&self) -> Result<LedgerSnapshot> {
        let conn = self.lock();

        let mut stmt =
            conn.prepare("SELECT id, name, balance, created_at, updated_at FROM accounts")?;
        let accounts = stmt
            .query_map([], Self::parse_account)?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();

        let mut stmt = conn.prepare("SELECT id, name, brand, created_at FROM items")?;
        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT account_id, amount, date, details FROM transactions")?;
        let existing_keys = stmt
            .query_map([], |row| {
                Ok(TransactionKey {
                    account_id: row.get(0)?,
                    amount_bits: row.get::<_, f64>(1)?.to_bits(),
                    date: row.get(2)?,
                    details: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;

        Ok(LedgerSnapshot {
            accounts,
            items,
            existing_keys,
        })
    }

    fn apply_merge(&self, plan: &MergePlan) -> Result<MergeOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        for item in &plan.new_items {
            tx.execute(
                "INSERT INTO items (id, name, brand, created_at) VALUES (?, ?, ?, ?)",
                params![item.id, item.name, item.brand, item.created_at],
            )?;
        }

        for record in &plan.transactions {
            Self::insert_transaction(&tx, record)?;
        }

        tx.commit()?;

        Ok(MergeOutcome {
            merged: plan.transactions.len(),
            items_created: plan.new_items.len(),
        })
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, name, balance, created_at, updated_at FROM accounts ORDER BY name")?;
        let accounts = stmt
            .query_map([], Self::parse_account)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, name, brand, created_at FROM items ORDER BY name")?;
        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, amount, date, created_at, updated_at, details, kind,
                    affects_balance, account_id, category, store_name, items
             FROM transactions
             ORDER BY date DESC
             LIMIT ?",
        )?;
        let transactions = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], Self::parse_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    fn create_account(&self, name: &str, balance: f64) -> Result<Account> {
        let account = Account::new(name, balance);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO accounts (id, name, balance, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                account.id,
                account.name,
                account.balance,
                account.created_at,
                account.updated_at
            ],
        )?;
        Ok(account)
    }

    fn create_item(&self, name: &str, brand: Option<&str>) -> Result<Item> {
        let item = Item::new(name, brand.map(ToString::to_string));
        let conn = self.lock();
        conn.execute(
            "INSERT INTO items (id, name, brand, created_at) VALUES (?, ?, ?, ?)",
            params![item.id, item.name, item.brand, item.created_at],
        )?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn setup() -> SqliteLedger {
        SqliteLedger::open_in_memory().unwrap()
    }

    #[test]
    fn test_open_migrates_and_reopens_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let ledger = SqliteLedger::open(&path).unwrap();
        ledger.create_account("Checking", 1.0).unwrap();
        drop(ledger);

        let reopened = SqliteLedger::open(&path).unwrap();
        assert_eq!(reopened.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_create_and_list_accounts() {
        let ledger = setup();
        ledger.create_account("Checking", 100.0).unwrap();
        ledger.create_account("Cash", 25.5).unwrap();

        let accounts = ledger.list_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "Cash");
    }

    #[test]
    fn test_merge_updates_balance() {
        let ledger = setup();
        let account = ledger.create_account("Checking", 100.0).unwrap();

        let mut expense = Transaction::new(&account.id, 30.0, "groceries");
        expense.category = "food".to_string();
        let mut income = Transaction::new(&account.id, 50.0, "refund");
        income.kind = TransactionType::Income;

        let plan = MergePlan {
            new_items: Vec::new(),
            transactions: vec![expense, income],
        };
        let outcome = ledger.apply_merge(&plan).unwrap();
        assert_eq!(outcome.merged, 2);

        let accounts = ledger.list_accounts().unwrap();
        assert!((accounts[0].balance - 120.0).abs() < f64::EPSILON);

        let transactions = ledger.list_transactions(10).unwrap();
        assert_eq!(transactions.len(), 2);
    }

    #[test]
    fn test_merge_is_atomic_on_failure() {
        let ledger = setup();
        let account = ledger.create_account("Checking", 100.0).unwrap();

        let good = Transaction::new(&account.id, 10.0, "ok");
        let bad = Transaction::new("missing-account", 10.0, "fails");

        let plan = MergePlan {
            new_items: vec![Item::new("Olive Oil", None)],
            transactions: vec![good, bad],
        };
        let err = ledger.apply_merge(&plan).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Nothing from the failed plan is visible
        assert!(ledger.list_transactions(10).unwrap().is_empty());
        assert!(ledger.list_items().unwrap().is_empty());
        let accounts = ledger.list_accounts().unwrap();
        assert!((accounts[0].balance - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_contents() {
        let ledger = setup();
        let account = ledger.create_account("Checking", 80.0).unwrap();
        ledger.create_item("Olive Oil", Some("Acme")).unwrap();

        let merged = Transaction::new(&account.id, 12.0, "lunch");
        let key = merged.natural_key();
        ledger
            .apply_merge(&MergePlan {
                new_items: Vec::new(),
                transactions: vec![merged],
            })
            .unwrap();

        let snapshot = ledger.snapshot().unwrap();
        assert!(snapshot.account(&account.id).is_some());
        assert!(snapshot.item_by_name("olive oil").is_some());
        assert!(snapshot.contains_key(&key));

        let absent = Transaction::new(&account.id, 99.0, "other");
        assert!(!snapshot.contains_key(&absent.natural_key()));
    }

    #[test]
    fn test_transaction_round_trip_with_items() {
        let ledger = setup();
        let account = ledger.create_account("Checking", 50.0).unwrap();

        let mut tx = Transaction::new(&account.id, 9.5, "market run");
        tx.store_name = Some("Corner Market".to_string());
        tx.items = Some(vec![TransactionItemRef {
            item_id: Some("itm_1".to_string()),
            name: "Oat Milk".to_string(),
            quantity: Some(2),
            price: Some(4.75),
        }]);

        ledger
            .apply_merge(&MergePlan {
                new_items: Vec::new(),
                transactions: vec![tx.clone()],
            })
            .unwrap();

        let stored = ledger.list_transactions(1).unwrap().remove(0);
        assert_eq!(stored, tx);
    }
}

//! Account model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::now_ms;

/// A money account (cash, bank, card) holding a running balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique identifier
    pub id: String,
    /// Display name, e.g. "Checking"
    pub name: String,
    /// Current balance in the ledger currency
    pub balance: f64,
    /// Creation timestamp (unix ms)
    pub created_at: u64,
    /// Last update timestamp (unix ms)
    pub updated_at: u64,
}

impl Account {
    /// Create a new account with the given name and opening balance
    #[must_use]
    pub fn new(name: impl Into<String>, balance: f64) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            balance,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_new() {
        let account = Account::new("Checking", 120.0);
        assert_eq!(account.name, "Checking");
        assert!((account.balance - 120.0).abs() < f64::EPSILON);
        assert_eq!(account.created_at, account.updated_at);
        assert!(!account.id.is_empty());
    }
}

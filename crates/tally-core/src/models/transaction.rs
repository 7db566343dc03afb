//! Transaction model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::now_ms;

/// Direction of a transaction relative to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

/// A line item attached to a transaction (e.g. one product on a receipt)
///
/// `item_id` is `None` when the source device could not resolve the name
/// against its own catalog; the receiving side re-resolves it during sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItemRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier
    pub id: String,
    /// Amount in the ledger currency, always positive
    pub amount: f64,
    /// Transaction date (unix ms)
    pub date: u64,
    /// Creation timestamp (unix ms)
    pub created_at: u64,
    /// Last update timestamp (unix ms)
    pub updated_at: u64,
    /// Free-form description
    pub details: String,
    /// Income, expense, or transfer
    pub kind: TransactionType,
    /// Whether merging this transaction moves the account balance
    pub affects_balance: bool,
    /// Owning account
    pub account_id: String,
    /// User-facing category, e.g. "groceries"
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<TransactionItemRef>>,
}

impl Transaction {
    /// Create a new expense transaction; mostly a test/CLI convenience
    #[must_use]
    pub fn new(account_id: impl Into<String>, amount: f64, details: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            date: now,
            created_at: now,
            updated_at: now,
            details: details.into(),
            kind: TransactionType::Expense,
            affects_balance: true,
            account_id: account_id.into(),
            category: String::new(),
            store_name: None,
            items: None,
        }
    }

    pub const fn is_income(&self) -> bool {
        matches!(self.kind, TransactionType::Income)
    }

    /// Whether merging this transaction draws money out of the account
    pub const fn reduces_balance(&self) -> bool {
        self.affects_balance && !self.is_income()
    }

    /// Natural key used for duplicate detection across devices
    #[must_use]
    pub fn natural_key(&self) -> TransactionKey {
        TransactionKey {
            account_id: self.account_id.clone(),
            // Bitwise equality is exactly what "same amount" means here;
            // both sides serialize the same f64.
            amount_bits: self.amount.to_bits(),
            date: self.date,
            details: self.details.clone(),
        }
    }
}

/// Identity of a transaction independent of its device-assigned id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub account_id: String,
    pub amount_bits: u64,
    pub date: u64,
    pub details: String,
}

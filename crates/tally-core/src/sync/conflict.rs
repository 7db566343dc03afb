//! Per-transaction conflict classification
//!
//! `classify` is a pure function of one incoming transaction and a ledger
//! snapshot. Rules fire in priority order and only the first match is
//! reported; if a later merge surfaces a second problem the transaction is
//! re-classified from scratch rather than patched.

use crate::db::LedgerSnapshot;
use crate::models::{ConflictType, SyncConflict, Transaction, TransactionItemRef};
use crate::sync::matcher;

/// Classifies incoming transactions against a ledger snapshot
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    min_similarity: f32,
    max_suggestions: usize,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self {
            min_similarity: matcher::DEFAULT_MIN_SIMILARITY,
            max_suggestions: 5,
        }
    }
}

impl ConflictDetector {
    #[must_use]
    pub const fn new(min_similarity: f32, max_suggestions: usize) -> Self {
        Self {
            min_similarity,
            max_suggestions,
        }
    }

    /// Classify one transaction; `None` means eligible for immediate merge
    ///
    /// Priority order: invalid account, insufficient balance, unknown item,
    /// duplicate. A transaction never carries two conflicts in one pass.
    #[must_use]
    pub fn classify(
        &self,
        transaction: &Transaction,
        snapshot: &LedgerSnapshot,
    ) -> Option<SyncConflict> {
        let Some(account) = snapshot.account(&transaction.account_id) else {
            return Some(SyncConflict {
                conflict_type: ConflictType::InvalidAccount,
                transaction_id: transaction.id.clone(),
                description: format!(
                    "Account '{}' does not exist on this device",
                    transaction.account_id
                ),
                suggestion: Some("Skip this transaction or recreate the account first".to_string()),
            });
        };

        if transaction.reduces_balance() && account.balance < transaction.amount {
            return Some(SyncConflict {
                conflict_type: ConflictType::InsufficientBalance {
                    account_id: account.id.clone(),
                    account_name: account.name.clone(),
                    current_balance: account.balance,
                    required: transaction.amount,
                },
                transaction_id: transaction.id.clone(),
                description: format!(
                    "Transaction amount ${:.2} exceeds account '{}' balance ${:.2}",
                    transaction.amount, account.name, account.balance
                ),
                suggestion: Some(format!(
                    "Reduce amount to ${:.2} or skip the transaction",
                    account.balance
                )),
            });
        }

        if let Some(unknown) = self.first_unknown_item(transaction, snapshot) {
            let suggested_matches = matcher::suggest(
                &unknown.name,
                snapshot.items(),
                self.max_suggestions,
                self.min_similarity,
            );
            return Some(SyncConflict {
                conflict_type: ConflictType::UnknownItem {
                    item_name: unknown.name.clone(),
                    suggested_matches,
                },
                transaction_id: transaction.id.clone(),
                description: format!("Item '{}' is not in the local catalog", unknown.name),
                suggestion: Some("Map to an existing item or create a new one".to_string()),
            });
        }

        if snapshot.contains_key(&transaction.natural_key()) {
            return Some(SyncConflict {
                conflict_type: ConflictType::DuplicateTransaction,
                transaction_id: transaction.id.clone(),
                description: format!(
                    "An identical transaction (${:.2}, '{}') already exists on account '{}'",
                    transaction.amount, transaction.details, account.name
                ),
                suggestion: Some("Skip this transaction to avoid a double entry".to_string()),
            });
        }

        None
    }

    /// First line item the local catalog cannot resolve
    ///
    /// A reference resolves if its id is in the catalog, or failing that,
    /// if an item with the same name exists (case-insensitive).
    fn first_unknown_item<'a>(
        &self,
        transaction: &'a Transaction,
        snapshot: &LedgerSnapshot,
    ) -> Option<&'a TransactionItemRef> {
        transaction
            .items
            .as_ref()?
            .iter()
            .find(|item_ref| resolve_item_ref(item_ref, snapshot).is_none())
    }
}

/// Rebind every resolvable item reference to its catalog id before merge
pub(crate) fn bind_item_refs(
    transaction: &Transaction,
    snapshot: &LedgerSnapshot,
) -> Transaction {
    let mut bound = transaction.clone();
    if let Some(items) = &mut bound.items {
        for item_ref in items {
            if let Some(id) = resolve_item_ref(item_ref, snapshot) {
                item_ref.item_id = Some(id);
            }
        }
    }
    bound
}

/// Resolve an incoming item reference to a local catalog id
pub(crate) fn resolve_item_ref(
    item_ref: &TransactionItemRef,
    snapshot: &LedgerSnapshot,
) -> Option<String> {
    if let Some(id) = &item_ref.item_id {
        if snapshot.item_by_id(id).is_some() {
            return Some(id.clone());
        }
    }
    snapshot
        .item_by_name(&item_ref.name)
        .map(|item| item.id.clone())
}

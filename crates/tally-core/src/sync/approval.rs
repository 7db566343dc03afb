//! Approval-driven merge
//!
//! Turns an operator decision plus per-conflict resolutions into a merge
//! plan and applies it as one atomic unit. A failed merge leaves the
//! pending entry queued and retriable; only success (or rejection)
//! removes it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::db::{Ledger, MergePlan};
use crate::error::{Error, Result};
use crate::models::{ConflictResolution, Item, MergeResult, PendingSyncData};
use crate::sync::conflict::{bind_item_refs, resolve_item_ref};
use crate::sync::queue::PendingSyncQueue;

pub struct ApprovalResolver {
    queue: Arc<PendingSyncQueue>,
    ledger: Arc<dyn Ledger>,
}

impl ApprovalResolver {
    pub fn new(queue: Arc<PendingSyncQueue>, ledger: Arc<dyn Ledger>) -> Self {
        Self { queue, ledger }
    }

    /// Apply the operator's decision for one pending sync
    pub fn resolve(
        &self,
        sync_id: &str,
        approved: bool,
        resolutions: &HashMap<String, ConflictResolution>,
    ) -> Result<MergeResult> {
        let Some(pending) = self.queue.get(sync_id) else {
            return Err(Error::NotFound(sync_id.to_string()));
        };

        if !approved {
            self.queue.remove(sync_id);
            tracing::info!(sync_id, "Pending sync rejected");
            return Ok(MergeResult {
                sync_id: sync_id.to_string(),
                approved: false,
                merged: 0,
                skipped: pending.payload.transactions.len(),
                items_created: 0,
                message: "Sync rejected, no changes applied".to_string(),
            });
        }

        let conflicted: BTreeSet<&str> = pending
            .conflicts
            .iter()
            .map(|conflict| conflict.transaction_id.as_str())
            .collect();
        let missing: Vec<&str> = conflicted
            .iter()
            .filter(|id| !resolutions.contains_key(**id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(Error::IncompleteResolution(format!(
                "missing resolutions for transactions: {}",
                missing.join(", ")
            )));
        }

        let (plan, skipped) = self.build_plan(&pending, &conflicted, resolutions)?;
        let outcome = self.ledger.apply_merge(&plan)?;
        self.queue.remove(sync_id);
        tracing::info!(
            sync_id,
            merged = outcome.merged,
            skipped,
            items_created = outcome.items_created,
            "Pending sync approved and merged"
        );

        Ok(MergeResult {
            sync_id: sync_id.to_string(),
            approved: true,
            merged: outcome.merged,
            skipped,
            items_created: outcome.items_created,
            message: format!(
                "Merged {} transactions ({} skipped)",
                outcome.merged, skipped
            ),
        })
    }

    fn build_plan(
        &self,
        pending: &PendingSyncData,
        conflicted: &BTreeSet<&str>,
        resolutions: &HashMap<String, ConflictResolution>,
    ) -> Result<(MergePlan, usize)> {
        let snapshot = self.ledger.snapshot()?;
        let mut plan = MergePlan::default();
        let mut skipped = 0usize;

        for transaction in &pending.payload.transactions {
            if !conflicted.contains(transaction.id.as_str()) {
                plan.transactions.push(bind_item_refs(transaction, &snapshot));
                continue;
            }

            // Presence was checked above
            let Some(resolution) = resolutions.get(transaction.id.as_str()) else {
                return Err(Error::IncompleteResolution(transaction.id.clone()));
            };

            match resolution {
                ConflictResolution::SkipTransaction => skipped += 1,
                ConflictResolution::AdjustAmount { new_amount } => {
                    let mut adjusted = bind_item_refs(transaction, &snapshot);
                    adjusted.amount = *new_amount;
                    plan.transactions.push(adjusted);
                }
                ConflictResolution::MapItem { item_id } => {
                    if snapshot.item_by_id(item_id).is_none() {
                        return Err(Error::Validation(format!(
                            "cannot map to unknown item '{item_id}'"
                        )));
                    }
                    let mut mapped = transaction.clone();
                    if let Some(items) = &mut mapped.items {
                        for item_ref in items {
                            match resolve_item_ref(item_ref, &snapshot) {
                                Some(id) => item_ref.item_id = Some(id),
                                None => item_ref.item_id = Some(item_id.clone()),
                            }
                        }
                    }
                    plan.transactions.push(mapped);
                }
                ConflictResolution::CreateNewItem => {
                    let mut created = transaction.clone();
                    if let Some(items) = &mut created.items {
                        for item_ref in items {
                            if let Some(id) = resolve_item_ref(item_ref, &snapshot) {
                                item_ref.item_id = Some(id);
                                continue;
                            }
                            // Reuse an item created earlier in this same plan
                            // so one batch never mints duplicates
                            let existing = plan
                                .new_items
                                .iter()
                                .find(|item| item.name.eq_ignore_ascii_case(&item_ref.name))
                                .map(|item| item.id.clone());
                            let id = match existing {
                                Some(id) => id,
                                None => {
                                    let item = Item::new(item_ref.name.clone(), None);
                                    let id = item.id.clone();
                                    plan.new_items.push(item);
                                    id
                                }
                            };
                            item_ref.item_id = Some(id);
                        }
                    }
                    plan.transactions.push(created);
                }
            }
        }

        Ok((plan, skipped))
    }
}

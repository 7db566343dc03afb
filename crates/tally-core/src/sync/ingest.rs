//! Payload ingestion
//!
//! Validates an uploaded batch against the active session's token, runs
//! every transaction through the conflict detector, and either merges the
//! whole batch immediately or parks it for operator approval. A partially
//! conflicted batch is never split: the clean rows wait with the rest so
//! one approval decision covers one sync unit.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::{Ledger, MergePlan};
use crate::error::{Error, Result};
use crate::models::{PendingSyncData, SyncDataPayload, SyncDataResponse};
use crate::sync::conflict::{bind_item_refs, ConflictDetector};
use crate::sync::queue::PendingSyncQueue;
use crate::sync::session::PairingSessionManager;
use crate::util::now_ms;

pub struct SyncIngestService {
    sessions: Arc<PairingSessionManager>,
    queue: Arc<PendingSyncQueue>,
    ledger: Arc<dyn Ledger>,
    detector: ConflictDetector,
}

impl SyncIngestService {
    pub fn new(
        sessions: Arc<PairingSessionManager>,
        queue: Arc<PendingSyncQueue>,
        ledger: Arc<dyn Ledger>,
        detector: ConflictDetector,
    ) -> Self {
        Self {
            sessions,
            queue,
            ledger,
            detector,
        }
    }

    /// Accept one payload for the paired session
    ///
    /// On any storage failure nothing is merged and nothing is enqueued;
    /// the session stays open so the remote device may retry.
    pub fn ingest(&self, token: &str, payload: SyncDataPayload) -> Result<SyncDataResponse> {
        self.sessions.begin_ingest(token)?;
        validate_payload(&payload)?;

        let snapshot = self.ledger.snapshot()?;
        let conflicts: Vec<_> = payload
            .transactions
            .iter()
            .filter_map(|transaction| self.detector.classify(transaction, &snapshot))
            .collect();

        if conflicts.is_empty() {
            let plan = MergePlan {
                new_items: Vec::new(),
                transactions: payload
                    .transactions
                    .iter()
                    .map(|transaction| bind_item_refs(transaction, &snapshot))
                    .collect(),
            };
            let outcome = self.ledger.apply_merge(&plan)?;
            self.sessions.complete_ingest(token);
            tracing::info!(
                device = %payload.device_name,
                merged = outcome.merged,
                "Sync batch merged without conflicts"
            );
            return Ok(SyncDataResponse {
                success: true,
                pending_approval: false,
                conflicts: Vec::new(),
                message: format!("Merged {} transactions", outcome.merged),
            });
        }

        let pending = PendingSyncData {
            id: Uuid::new_v4().to_string(),
            device_name: payload.device_name.clone(),
            conflicts: conflicts.clone(),
            received_at: now_ms(),
            payload,
        };
        tracing::info!(
            device = %pending.device_name,
            sync_id = %pending.id,
            conflicts = conflicts.len(),
            "Sync batch parked for approval"
        );
        self.queue.insert(pending);
        self.sessions.complete_ingest(token);

        Ok(SyncDataResponse {
            success: true,
            pending_approval: true,
            conflicts,
            message: "Data received, pending user approval".to_string(),
        })
    }
}

/// Reject malformed payloads before any classification runs
fn validate_payload(payload: &SyncDataPayload) -> Result<()> {
    if payload.device_name.trim().is_empty() {
        return Err(Error::Validation("deviceName must not be empty".into()));
    }
    if payload.transactions.is_empty() {
        return Err(Error::Validation("payload contains no transactions".into()));
    }
    for transaction in &payload.transactions {
        if transaction.id.trim().is_empty() {
            return Err(Error::Validation("transaction id must not be empty".into()));
        }
        if transaction.account_id.trim().is_empty() {
            return Err(Error::Validation(format!(
                "transaction '{}' has no account id",
                transaction.id
            )));
        }
        if !transaction.amount.is_finite() || transaction.amount <= 0.0 {
            return Err(Error::Validation(format!(
                "transaction '{}' has a non-positive amount",
                transaction.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use std::time::Duration;

    use crate::db::SqliteLedger;
    use crate::models::{Transaction, TransactionItemRef};

    use super::*;

    struct Fixture {
        service: SyncIngestService,
        sessions: Arc<PairingSessionManager>,
        queue: Arc<PendingSyncQueue>,
        ledger: Arc<SqliteLedger>,
        token: String,
        account_id: String,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(PairingSessionManager::new(Duration::from_secs(900)));
        let queue = Arc::new(PendingSyncQueue::new());
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let account = ledger.create_account("Checking", 100.0).unwrap();
        ledger.create_item("Oat Milk", None).unwrap();

        let session = sessions.start(8080).unwrap();
        let (token, _) = sessions.authenticate(&session.pin, "phone").unwrap();

        let service = SyncIngestService::new(
            sessions.clone(),
            queue.clone(),
            ledger.clone(),
            ConflictDetector::default(),
        );
        Fixture {
            service,
            sessions,
            queue,
            ledger,
            token,
            account_id: account.id,
        }
    }

    fn payload(transactions: Vec<Transaction>) -> SyncDataPayload {
        SyncDataPayload {
            transactions,
            device_name: "phone".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn test_clean_payload_merges_immediately() {
        let fx = fixture();
        let batch = payload(vec![
            Transaction::new(&fx.account_id, 10.0, "coffee"),
            Transaction::new(&fx.account_id, 20.0, "lunch"),
        ]);

        let response = fx.service.ingest(&fx.token, batch).unwrap();
        assert!(response.success);
        assert!(!response.pending_approval);
        assert!(response.conflicts.is_empty());

        assert_eq!(fx.ledger.list_transactions(10).unwrap().len(), 2);
        assert!(fx.queue.is_empty());
        // 100 - 10 - 20
        let accounts = fx.ledger.list_accounts().unwrap();
        assert!((accounts[0].balance - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_conflicted_batch_parks_whole_payload() {
        let fx = fixture();
        let clean = Transaction::new(&fx.account_id, 10.0, "coffee");
        let mut unknown = Transaction::new(&fx.account_id, 5.0, "groceries");
        unknown.items = Some(vec![TransactionItemRef {
            item_id: None,
            name: "Dragonfruit".to_string(),
            quantity: None,
            price: None,
        }]);

        let response = fx
            .service
            .ingest(&fx.token, payload(vec![clean, unknown]))
            .unwrap();
        assert!(response.pending_approval);
        assert_eq!(response.conflicts.len(), 1);

        // No ledger writes yet, clean rows included in the parked batch
        assert!(fx.ledger.list_transactions(10).unwrap().is_empty());
        let pending = fx.queue.list();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.transactions.len(), 2);
        assert_eq!(pending[0].conflicts.len(), 1);
    }

    #[test]
    fn test_clean_merge_binds_known_item_names() {
        let fx = fixture();
        let mut tx = Transaction::new(&fx.account_id, 4.0, "oat milk run");
        tx.items = Some(vec![TransactionItemRef {
            item_id: None,
            name: "oat milk".to_string(),
            quantity: Some(1),
            price: Some(4.0),
        }]);

        fx.service.ingest(&fx.token, payload(vec![tx])).unwrap();

        let stored = fx.ledger.list_transactions(1).unwrap().remove(0);
        let item_ref = &stored.items.unwrap()[0];
        assert!(item_ref.item_id.is_some());
    }

    #[test]
    fn test_unknown_token_rejected() {
        let fx = fixture();
        let batch = payload(vec![Transaction::new(&fx.account_id, 10.0, "coffee")]);
        let err = fx.service.ingest("bogus", batch).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_second_submission_rejected() {
        let fx = fixture();
        fx.service
            .ingest(
                &fx.token,
                payload(vec![Transaction::new(&fx.account_id, 10.0, "coffee")]),
            )
            .unwrap();

        let err = fx
            .service
            .ingest(
                &fx.token,
                payload(vec![Transaction::new(&fx.account_id, 5.0, "tea")]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyIngested));
    }

    #[test]
    fn test_validation_rejects_bad_payloads() {
        let fx = fixture();

        let err = fx.service.ingest(&fx.token, payload(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut negative = Transaction::new(&fx.account_id, 10.0, "coffee");
        negative.amount = -3.0;
        let err = fx
            .service
            .ingest(&fx.token, payload(vec![negative]))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // A failed validation does not consume the single submission
        assert!(fx.sessions.is_active());
    }
}

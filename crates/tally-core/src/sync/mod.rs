//! Device-to-device ledger sync core
//!
//! One device opens a time-boxed pairing session secured by a six-digit
//! PIN; a second device authenticates, uploads a transaction batch, and
//! every transaction is classified against the local ledger. Clean batches
//! merge immediately; anything conflicted is parked for operator review
//! and merged (or discarded) through an explicit resolution.
//!
//! [`SyncEngine`] is the facade the HTTP endpoint and the CLI call into;
//! the individual components underneath stay independently testable.

mod approval;
pub mod client;
mod conflict;
mod ingest;
pub mod matcher;
mod queue;
mod session;

pub use approval::ApprovalResolver;
pub use conflict::ConflictDetector;
pub use ingest::SyncIngestService;
pub use queue::PendingSyncQueue;
pub use session::{PairingSessionManager, SessionPhase};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::SyncSettings;
use crate::db::Ledger;
use crate::error::Result;
use crate::models::{
    ConflictResolution, MergeResult, PendingSyncData, ServerStatus, SyncDataPayload,
    SyncDataResponse, SyncSession,
};

/// Facade over the sync components, shared by the LAN endpoint and the
/// host-side control surface
///
/// A single merge mutex serializes `ingest` and `resolve`, so two merges
/// can never interleave their ledger writes, and a second concurrent
/// submission against one session deterministically sees the first one's
/// outcome.
pub struct SyncEngine {
    sessions: Arc<PairingSessionManager>,
    queue: Arc<PendingSyncQueue>,
    ingest_service: SyncIngestService,
    resolver: ApprovalResolver,
    settings: SyncSettings,
    server_running: AtomicBool,
    merge_lock: Mutex<()>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, settings: SyncSettings) -> Self {
        let sessions = Arc::new(PairingSessionManager::new(settings.session_ttl));
        let queue = Arc::new(PendingSyncQueue::new());
        let detector = ConflictDetector::new(settings.min_similarity, settings.max_suggestions);

        Self {
            ingest_service: SyncIngestService::new(
                sessions.clone(),
                queue.clone(),
                ledger.clone(),
                detector,
            ),
            resolver: ApprovalResolver::new(queue.clone(), ledger),
            sessions,
            queue,
            settings,
            server_running: AtomicBool::new(false),
            merge_lock: Mutex::new(()),
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Open a new pairing session
    pub fn start_session(&self, port: u16) -> Result<SyncSession> {
        self.sessions.start(port)
    }

    /// Close the active pairing session; idempotent
    pub fn stop_session(&self) {
        self.sessions.stop();
    }

    /// Exchange the PIN for a sync token
    pub fn authenticate(&self, pin: &str, device_name: &str) -> Result<(String, u64)> {
        self.sessions.authenticate(pin, device_name)
    }

    /// Accept one payload submission for the paired session
    pub fn ingest(&self, token: &str, payload: SyncDataPayload) -> Result<SyncDataResponse> {
        let _merge = self.merge_guard();
        self.ingest_service.ingest(token, payload)
    }

    /// Apply an operator decision for one pending sync
    pub fn resolve(
        &self,
        sync_id: &str,
        approved: bool,
        resolutions: &HashMap<String, ConflictResolution>,
    ) -> Result<MergeResult> {
        let _merge = self.merge_guard();
        self.resolver.resolve(sync_id, approved, resolutions)
    }

    /// Milliseconds until session expiry; 0 once expired or closed
    pub fn remaining_ms(&self) -> u64 {
        self.sessions.remaining_ms()
    }

    /// Pending batches awaiting review, oldest first
    pub fn list_pending(&self) -> Vec<PendingSyncData> {
        self.queue.list()
    }

    pub fn get_pending(&self, sync_id: &str) -> Option<PendingSyncData> {
        self.queue.get(sync_id)
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            running: self.server_running.load(Ordering::Relaxed),
            active_sessions: usize::from(self.sessions.is_active()),
            pending_approvals: self.queue.len(),
            port: self.sessions.port(),
        }
    }

    /// Record whether the LAN endpoint is currently bound
    pub fn set_server_running(&self, running: bool) {
        self.server_running.store(running, Ordering::Relaxed);
    }

    fn merge_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.merge_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::db::SqliteLedger;
    use crate::error::Error;
    use crate::models::{ConflictType, Transaction, TransactionItemRef};

    use super::*;

    fn engine_with_catalog() -> (SyncEngine, Arc<SqliteLedger>, String, String) {
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let account = ledger.create_account("Checking", 100.0).unwrap();
        let barista = ledger.create_item("Oat Milk Barista", None).unwrap();
        ledger.create_item("Goat Milk", None).unwrap();

        let engine = SyncEngine::new(ledger.clone(), SyncSettings::default());
        (engine, ledger, account.id, barista.id)
    }

    fn oat_milk_payload(account_id: &str) -> SyncDataPayload {
        let mut tx = Transaction::new(account_id, 4.5, "morning shop");
        tx.items = Some(vec![TransactionItemRef {
            item_id: None,
            name: "Oat Milk".to_string(),
            quantity: Some(1),
            price: Some(4.5),
        }]);
        SyncDataPayload {
            transactions: vec![tx],
            device_name: "Device B".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn test_end_to_end_unknown_item_map_resolution() {
        let (engine, ledger, account_id, barista_id) = engine_with_catalog();

        // Device A opens a session, device B pairs with the PIN
        let session = engine.start_session(8080).unwrap();
        assert_eq!(session.pin.len(), 6);
        let (token, expires_in) = engine.authenticate(&session.pin, "Device B").unwrap();
        assert!(expires_in <= 900);

        // Device B uploads one transaction with an unknown item
        let response = engine
            .ingest(&token, oat_milk_payload(&account_id))
            .unwrap();
        assert!(response.success);
        assert!(response.pending_approval);
        assert_eq!(response.conflicts.len(), 1);
        match &response.conflicts[0].conflict_type {
            ConflictType::UnknownItem {
                item_name,
                suggested_matches,
            } => {
                assert_eq!(item_name, "Oat Milk");
                assert!(suggested_matches.len() >= 2);
                for pair in suggested_matches.windows(2) {
                    assert!(pair[0].similarity_score >= pair[1].similarity_score);
                }
            }
            other => panic!("expected unknown item conflict, got {other:?}"),
        }

        // Nothing merged yet; exactly one pending batch
        assert!(ledger.list_transactions(10).unwrap().is_empty());
        let pending = engine.list_pending();
        assert_eq!(pending.len(), 1);
        let sync_id = pending[0].id.clone();
        let conflicted_tx = pending[0].payload.transactions[0].id.clone();

        // Operator maps the unknown name onto the canonical catalog item
        let mut resolutions = HashMap::new();
        resolutions.insert(
            conflicted_tx,
            ConflictResolution::MapItem {
                item_id: barista_id.clone(),
            },
        );
        let result = engine.resolve(&sync_id, true, &resolutions).unwrap();
        assert!(result.approved);
        assert_eq!(result.merged, 1);
        assert_eq!(result.items_created, 0);

        // Ledger shows the transaction bound to the existing item and no
        // duplicate catalog entry
        let stored = ledger.list_transactions(10).unwrap();
        assert_eq!(stored.len(), 1);
        let item_ref = &stored[0].items.as_ref().unwrap()[0];
        assert_eq!(item_ref.item_id.as_deref(), Some(barista_id.as_str()));
        assert_eq!(ledger.list_items().unwrap().len(), 2);
        assert!(engine.list_pending().is_empty());
    }

    #[test]
    fn test_session_closes_after_single_ingest() {
        let (engine, _ledger, account_id, _) = engine_with_catalog();
        let session = engine.start_session(8080).unwrap();
        let (token, _) = engine.authenticate(&session.pin, "Device B").unwrap();

        engine.ingest(&token, oat_milk_payload(&account_id)).unwrap();
        let err = engine
            .ingest(&token, oat_milk_payload(&account_id))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyIngested));
    }

    #[test]
    fn test_status_reflects_session_and_queue() {
        let (engine, _ledger, account_id, _) = engine_with_catalog();

        let idle = engine.status();
        assert_eq!(idle.active_sessions, 0);
        assert_eq!(idle.pending_approvals, 0);

        let session = engine.start_session(8181).unwrap();
        engine.set_server_running(true);
        let listening = engine.status();
        assert!(listening.running);
        assert_eq!(listening.active_sessions, 1);
        assert_eq!(listening.port, 8181);

        let (token, _) = engine.authenticate(&session.pin, "Device B").unwrap();
        engine.ingest(&token, oat_milk_payload(&account_id)).unwrap();
        assert_eq!(engine.status().pending_approvals, 1);

        engine.stop_session();
        engine.set_server_running(false);
        let stopped = engine.status();
        assert!(!stopped.running);
        assert_eq!(stopped.active_sessions, 0);
        // Pending approvals outlive the session
        assert_eq!(stopped.pending_approvals, 1);
    }

    #[test]
    fn test_clean_batch_immediate_merge_not_pending() {
        let (engine, ledger, account_id, _) = engine_with_catalog();
        let session = engine.start_session(8080).unwrap();
        let (token, _) = engine.authenticate(&session.pin, "Device B").unwrap();

        let payload = SyncDataPayload {
            transactions: vec![Transaction::new(&account_id, 12.0, "coffee beans")],
            device_name: "Device B".to_string(),
            timestamp: 1,
        };
        let response = engine.ingest(&token, payload).unwrap();
        assert!(!response.pending_approval);

        assert!(engine.list_pending().is_empty());
        assert_eq!(ledger.list_transactions(10).unwrap().len(), 1);
    }
}

//! Pending approval queue
//!
//! Process-lifetime only: an interrupted approval is lost on restart and
//! the remote device, which still holds its own ledger, must resync.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::PendingSyncData;

/// In-memory store of received batches awaiting operator review
#[derive(Default)]
pub struct PendingSyncQueue {
    inner: Mutex<HashMap<String, PendingSyncData>>,
}

impl PendingSyncQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingSyncData>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn insert(&self, pending: PendingSyncData) {
        self.lock().insert(pending.id.clone(), pending);
    }

    pub fn get(&self, sync_id: &str) -> Option<PendingSyncData> {
        self.lock().get(sync_id).cloned()
    }

    pub fn remove(&self, sync_id: &str) -> Option<PendingSyncData> {
        self.lock().remove(sync_id)
    }

    /// All pending batches, oldest arrival first
    pub fn list(&self) -> Vec<PendingSyncData> {
        let mut pending: Vec<PendingSyncData> = self.lock().values().cloned().collect();
        pending.sort_by(|a, b| a.received_at.cmp(&b.received_at).then_with(|| a.id.cmp(&b.id)));
        pending
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

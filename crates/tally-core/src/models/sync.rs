//! Device sync models: pairing sessions, payloads, conflicts, resolutions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Transaction;

/// A time-boxed pairing session; at most one exists at a time
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// Six-digit human-enterable PIN shown on the host device
    pub pin: String,
    /// Opaque secret, present only once a remote device has paired
    pub token: Option<String>,
    /// Creation timestamp (unix ms)
    pub created_at: u64,
    /// Expiry timestamp (unix ms); `expires_at - created_at` is the fixed TTL
    pub expires_at: u64,
    /// False once expired or closed
    pub is_active: bool,
    /// Name reported by the paired remote device
    pub device_name: Option<String>,
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSession")
            .field("pin", &self.pin)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .field("device_name", &self.device_name)
            .finish()
    }
}

/// Batch of transactions uploaded by the remote device, consumed once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDataPayload {
    pub transactions: Vec<Transaction>,
    pub device_name: String,
    pub timestamp: u64,
}

/// Body of `POST /pair`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    pub pin: String,
    pub device_name: String,
}

/// Response of `POST /pair`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Seconds until the session expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    pub message: String,
}

/// Response of `POST /sync`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDataResponse {
    pub success: bool,
    pub pending_approval: bool,
    pub conflicts: Vec<SyncConflict>,
    pub message: String,
}

/// One reason a transaction cannot be merged automatically
///
/// Immutable once created; attached to exactly one `PendingSyncData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub conflict_type: ConflictType,
    pub transaction_id: String,
    /// Human-readable explanation shown on the review screen
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Tagged conflict classification; each variant carries only its own payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConflictType {
    InsufficientBalance {
        account_id: String,
        account_name: String,
        current_balance: f64,
        required: f64,
    },
    UnknownItem {
        item_name: String,
        suggested_matches: Vec<ItemMatch>,
    },
    DuplicateTransaction,
    InvalidAccount,
}

/// A similarity-scored candidate for an unknown item name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMatch {
    pub item_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Normalized similarity in [0.0, 1.0]
    pub similarity_score: f32,
}

/// A received batch parked for operator review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSyncData {
    /// Unique per ingest batch
    pub id: String,
    /// The entire payload, clean transactions included; resolution needs
    /// the full batch for context and the merge stays atomic
    pub payload: SyncDataPayload,
    pub conflicts: Vec<SyncConflict>,
    /// Arrival timestamp (unix ms), used for listing order
    pub received_at: u64,
    pub device_name: String,
}

/// Operator decision for one conflicting transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConflictResolution {
    /// Leave the transaction out of the merge
    SkipTransaction,
    /// Merge with the amount replaced (insufficient-balance override)
    AdjustAmount { new_amount: f64 },
    /// Bind the unknown item name to an existing catalog item
    MapItem { item_id: String },
    /// Create a catalog item from the incoming name, then bind to it
    CreateNewItem,
}

/// Outcome of an approval or rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub sync_id: String,
    pub approved: bool,
    /// Transactions written to the ledger
    pub merged: usize,
    /// Transactions skipped by operator resolution
    pub skipped: usize,
    /// Catalog items created by `CreateNewItem` resolutions
    pub items_created: usize,
    pub message: String,
}

/// Snapshot returned by the status endpoint and host-side `status()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    pub active_sessions: usize,
    pub pending_approvals: usize,
    pub port: u16,
}

/// What the host shows after starting a pairing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub pin: String,
    /// Connection URL the remote device should use
    pub url: String,
    /// Seconds until the session expires
    pub expires_in: u64,
}

//! Error types for tally-core

use thiserror::Error;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
///
/// Sync conflicts are deliberately not part of this enum; a detected
/// conflict is an expected outcome carried in `SyncDataResponse`, not a
/// failure.
#[derive(Error, Debug)]
pub enum Error {
    /// A pairing session is already active
    #[error("A pairing session is already active")]
    AlreadyActive,

    /// PIN does not match the active pairing session
    #[error("Invalid PIN")]
    InvalidPin,

    /// Pairing session has expired
    #[error("Pairing session expired")]
    Expired,

    /// Token missing, unknown, or no longer valid
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The session already received its single payload submission
    #[error("This pairing session already received a payload")]
    AlreadyIngested,

    /// Malformed sync payload
    #[error("Invalid payload: {0}")]
    Validation(String),

    /// Pending sync not found
    #[error("Pending sync not found: {0}")]
    NotFound(String),

    /// Approval is missing a resolution for a conflicting transaction
    #[error("Incomplete resolution: {0}")]
    IncompleteResolution(String),

    /// Ledger storage error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

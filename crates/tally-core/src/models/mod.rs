//! Data models for Tally

mod account;
mod item;
mod sync;
mod transaction;

pub use account::Account;
pub use item::Item;
pub use sync::{
    ConflictResolution, ConflictType, ItemMatch, MergeResult, PairRequest, PairResponse,
    PendingSyncData, ServerStatus, StartedSession, SyncConflict, SyncDataPayload,
    SyncDataResponse, SyncSession,
};
pub use transaction::{Transaction, TransactionItemRef, TransactionKey, TransactionType};

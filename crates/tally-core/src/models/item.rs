//! Catalog item model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::now_ms;

/// A purchasable item in the local catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique identifier
    pub id: String,
    /// Item name, e.g. "Olive Oil"
    pub name: String,
    /// Optional brand
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Creation timestamp (unix ms)
    pub created_at: u64,
}

impl Item {
    /// Create a new catalog item
    #[must_use]
    pub fn new(name: impl Into<String>, brand: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            brand,
            created_at: now_ms(),
        }
    }
}

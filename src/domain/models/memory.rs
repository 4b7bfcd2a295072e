//! Memory items and filters for the vector-store port.
//!
//! The vector-search implementation itself is an external collaborator; the
//! control plane only defines the tenant-scoped contract it consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One stored memory document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl MemoryItem {
    pub fn new(customer_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            content: content.into(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Filter applied to memory queries. The `customer_id` component is always
/// set by [`ScopedMemory`](crate::services::scoped_memory::ScopedMemory) and
/// cannot be supplied by callers of the scoped API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    pub customer_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub kind: Option<String>,
}

impl MemoryFilter {
    pub fn for_customer(customer_id: Uuid) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Self::default()
        }
    }

    /// Check whether an item satisfies this filter.
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(customer_id) = self.customer_id {
            if item.customer_id != customer_id {
                return false;
            }
        }
        if let Some(ref session_id) = self.session_id {
            if item
                .metadata
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_owned)
                != Some(session_id.clone())
            {
                return false;
            }
        }
        if let Some(ref kind) = self.kind {
            if item.metadata.get("kind").and_then(Value::as_str) != Some(kind.as_str()) {
                return false;
            }
        }
        true
    }
}

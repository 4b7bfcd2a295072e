//! Vector store port.
//!
//! The embedding and similarity-search implementation is an external
//! collaborator; this port is the contract
//! [`ScopedMemory`](crate::services::scoped_memory::ScopedMemory) wraps with
//! the tenant filter.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{MemoryFilter, MemoryItem};

/// Backing store for agent memory.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Similarity search over stored items, restricted by `filter`.
    async fn search(
        &self,
        query: &str,
        filter: &MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<MemoryItem>, StoreError>;

    /// Store an item. The item's `customer_id` is authoritative.
    async fn add(&self, item: MemoryItem) -> Result<Uuid, StoreError>;

    /// Exact-filter query, newest first.
    async fn query(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError>;

    /// Delete items matching the filter. Returns the removed count.
    async fn delete(&self, filter: &MemoryFilter) -> Result<u64, StoreError>;
}

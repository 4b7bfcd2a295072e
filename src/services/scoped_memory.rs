//! Tenant-scoped memory handle.
//!
//! Binds a vector-store handle to a fixed `customer_id` at construction.
//! Every operation composes the tenant into the filter; callers cannot
//! supply or override it, and a handle cannot be rebound.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{AgentContext, MemoryFilter, MemoryItem};
use crate::domain::ports::VectorStore;

/// Memory interface that enforces customer scoping.
#[derive(Clone)]
pub struct ScopedMemory {
    store: Arc<dyn VectorStore>,
    customer_id: Uuid,
}

impl ScopedMemory {
    /// Scope a store handle to one tenant.
    pub fn new(store: Arc<dyn VectorStore>, customer_id: Uuid) -> Self {
        Self { store, customer_id }
    }

    /// Scope a store handle to the tenant of a request context.
    pub fn for_context(store: Arc<dyn VectorStore>, context: &AgentContext) -> Self {
        Self::new(store, context.customer_id())
    }

    /// The tenant this handle is bound to.
    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    fn scoped(&self, mut filter: MemoryFilter) -> MemoryFilter {
        filter.customer_id = Some(self.customer_id);
        filter
    }

    /// Similarity search over this tenant's memories only.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<MemoryItem>, StoreError> {
        self.store
            .search(query, &self.scoped(MemoryFilter::default()), top_k)
            .await
    }

    /// Store content, force-tagged with this tenant's id.
    pub async fn add(&self, content: impl Into<String>) -> Result<Uuid, StoreError> {
        self.store
            .add(MemoryItem::new(self.customer_id, content))
            .await
    }

    /// Exact-filter query; the tenant component of the filter is overwritten.
    pub async fn query(
        &self,
        filter: MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        self.store.query(&self.scoped(filter), limit).await
    }

    /// Delete this tenant's memories for one session.
    pub async fn clear_session(&self, session_id: &str) -> Result<u64, StoreError> {
        let filter = MemoryFilter {
            session_id: Some(session_id.to_string()),
            ..MemoryFilter::default()
        };
        self.store.delete(&self.scoped(filter)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryVectorStore;

    #[tokio::test]
    async fn search_never_crosses_tenants() {
        let store = Arc::new(InMemoryVectorStore::new());
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let memory_a = ScopedMemory::new(store.clone(), tenant_a);
        let memory_b = ScopedMemory::new(store.clone(), tenant_b);

        memory_a.add("Revenue is $5,000,000").await.unwrap();

        let results = memory_b.search("revenue", 5).await.unwrap();
        assert!(results.is_empty());

        let own = memory_a.search("revenue", 5).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].customer_id, tenant_a);
    }

    #[tokio::test]
    async fn query_filter_tenant_component_is_overwritten() {
        let store = Arc::new(InMemoryVectorStore::new());
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        ScopedMemory::new(store.clone(), tenant_a)
            .add("alpha notes")
            .await
            .unwrap();

        // Even a filter naming tenant A cannot escape B's scope.
        let hostile = MemoryFilter {
            customer_id: Some(tenant_a),
            ..MemoryFilter::default()
        };
        let results = ScopedMemory::new(store, tenant_b)
            .query(hostile, 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn clear_session_removes_only_own_session() {
        let store = Arc::new(InMemoryVectorStore::new());
        let tenant = Uuid::new_v4();
        let memory = ScopedMemory::new(store.clone(), tenant);

        let item = MemoryItem::new(tenant, "scoped note")
            .with_metadata("session_id", serde_json::json!("s1"));
        store.add(item).await.unwrap();
        memory.add("other note").await.unwrap();

        let removed = memory.clear_session("s1").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(memory.query(MemoryFilter::default(), 10).await.unwrap().len(), 1);
    }
}

//! In-memory vector store.
//!
//! Reference implementation of the [`VectorStore`] port backed by token
//! overlap scoring. The production similarity search lives behind the same
//! port in an external service; this adapter keeps the scoped-memory
//! invariants testable without it.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{MemoryFilter, MemoryItem};
use crate::domain::ports::VectorStore;

/// In-memory [`VectorStore`].
#[derive(Default)]
pub struct InMemoryVectorStore {
    items: RwLock<Vec<MemoryItem>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

fn overlap_score(query_tokens: &[String], content: &str) -> usize {
    let content_tokens = tokenize(content);
    query_tokens
        .iter()
        .filter(|t| content_tokens.contains(t))
        .count()
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query: &str,
        filter: &MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        let query_tokens = tokenize(query);
        let items = self.items.read().await;
        let mut scored: Vec<(usize, MemoryItem)> = items
            .iter()
            .filter(|item| filter.matches(item))
            .map(|item| (overlap_score(&query_tokens, &item.content), item.clone()))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(top_k).map(|(_, item)| item).collect())
    }

    async fn add(&self, item: MemoryItem) -> Result<Uuid, StoreError> {
        let id = item.id;
        self.items.write().await.push(item);
        Ok(id)
    }

    async fn query(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        let items = self.items.read().await;
        let mut matched: Vec<MemoryItem> = items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn delete(&self, filter: &MemoryFilter) -> Result<u64, StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|item| !filter.matches(item));
        Ok((before - items.len()) as u64)
    }
}

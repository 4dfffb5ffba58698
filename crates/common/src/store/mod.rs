//! Relationship store
//!
//! Persistent, per-conversation mapping from a parent paper to at most
//! three discovered child papers. Keys are [`PaperId`]s, so every backend
//! is normalized on both read and write by construction.
//!
//! Backends:
//! - [`InMemoryRelationshipStore`] for tests and single-process use
//! - [`RedisRelationshipStore`] for persistence across restarts
//! - [`HttpRelationshipStore`] for the external relationship service

mod http_store;
mod redis_store;

pub use http_store::HttpRelationshipStore;
pub use redis_store::RedisRelationshipStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::errors::{AppError, Result};
use crate::ids::PaperId;
use crate::metrics;
use crate::models::ChildPaper;
use crate::MAX_CHILDREN;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Trait for relationship persistence
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Stored children of `parent` in this conversation (empty if none)
    async fn get(&self, chat_id: &str, parent: &PaperId) -> Result<Vec<ChildPaper>>;

    /// Merge `children` into the entry for `parent` and return the merged entry
    async fn merge(
        &self,
        chat_id: &str,
        parent: &PaperId,
        children: Vec<ChildPaper>,
    ) -> Result<Vec<ChildPaper>>;

    /// Remove every entry of a conversation, returning how many parents were dropped
    async fn delete_conversation(&self, chat_id: &str) -> Result<usize>;

    /// Backend name for logs and metrics
    fn backend_name(&self) -> &'static str;

    /// Connectivity check
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch entries for several parents concurrently, skipping empty ones
    async fn get_many(
        &self,
        chat_id: &str,
        parents: &[PaperId],
    ) -> Result<HashMap<PaperId, Vec<ChildPaper>>> {
        let lookups = parents.iter().map(|parent| async move {
            self.get(chat_id, parent).await.map(|children| (parent.clone(), children))
        });

        let mut entries = HashMap::new();
        for result in join_all(lookups).await {
            let (parent, children) = result?;
            if !children.is_empty() {
                entries.insert(parent, children);
            }
        }
        Ok(entries)
    }
}

/// Merge `incoming` into `existing`: append unseen ids in order, never the
/// parent itself, then truncate to [`MAX_CHILDREN`].
pub fn merge_children(
    parent: &PaperId,
    existing: Vec<ChildPaper>,
    incoming: Vec<ChildPaper>,
) -> Vec<ChildPaper> {
    let mut merged = existing;

    for mut child in incoming {
        if &child.id == parent || merged.iter().any(|c| c.id == child.id) {
            continue;
        }
        child.source_parent_id = parent.clone();
        merged.push(child);
    }

    merged.truncate(MAX_CHILDREN);
    merged
}

/// In-process store
#[derive(Default)]
pub struct InMemoryRelationshipStore {
    entries: RwLock<HashMap<String, HashMap<PaperId, Vec<ChildPaper>>>>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn get(&self, chat_id: &str, parent: &PaperId) -> Result<Vec<ChildPaper>> {
        let entries = self.entries.read().await;
        let children = entries
            .get(chat_id)
            .and_then(|conversation| conversation.get(parent))
            .cloned()
            .unwrap_or_default();

        metrics::record_store_lookup(!children.is_empty(), self.backend_name());
        debug!(chat_id, paper_id = %parent, count = children.len(), "Relationship lookup");
        Ok(children)
    }

    async fn merge(
        &self,
        chat_id: &str,
        parent: &PaperId,
        children: Vec<ChildPaper>,
    ) -> Result<Vec<ChildPaper>> {
        let mut entries = self.entries.write().await;
        let conversation = entries.entry(chat_id.to_string()).or_default();
        let existing = conversation.remove(parent).unwrap_or_default();
        let merged = merge_children(parent, existing, children);

        conversation.insert(parent.clone(), merged.clone());
        debug!(chat_id, paper_id = %parent, total = merged.len(), "Relationships merged");
        Ok(merged)
    }

    async fn delete_conversation(&self, chat_id: &str) -> Result<usize> {
        let removed = self
            .entries
            .write()
            .await
            .remove(chat_id)
            .map(|conversation| conversation.len())
            .unwrap_or(0);
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Create a relationship store based on configuration
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn RelationshipStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory relationship store");
            Ok(Arc::new(InMemoryRelationshipStore::new()))
        }
        StoreBackend::Redis => {
            info!(url = %config.redis_url, "Connecting relationship store to Redis");
            Ok(Arc::new(RedisRelationshipStore::new(config).await?))
        }
        StoreBackend::Http => {
            let base_url = config.base_url.clone().ok_or_else(|| AppError::Configuration {
                message: "store.base_url is required for the http relationship store".to_string(),
            })?;
            info!(url = %base_url, "Using relationship service");
            Ok(Arc::new(HttpRelationshipStore::new(base_url, config.max_retry_elapsed_ms)?))
        }
    }
}

/// Log a failed relationship write and convert it into a storage error
pub fn storage_failure(backend: &str, chat_id: &str, parent: &PaperId, error: AppError) -> AppError {
    metrics::record_store_write_failure(backend);
    warn!(backend, chat_id, paper_id = %parent, error = %error, "Relationship write failed");
    match error {
        AppError::Storage { .. } => error,
        other => AppError::Storage { message: other.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn pid(s: &str) -> PaperId {
        PaperId::normalize(s).unwrap()
    }

    fn child(id: &str, parent: &str) -> ChildPaper {
        ChildPaper {
            id: pid(id),
            title: format!("Paper {}", id),
            source_parent_id: pid(parent),
            paper: None,
        }
    }

    fn ids(children: &[ChildPaper]) -> Vec<&str> {
        children.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_merge_dedups_and_keeps_first_appearance() {
        let parent = pid("P1");
        let first = merge_children(&parent, vec![], vec![child("A", "P1"), child("B", "P1")]);
        let second = merge_children(&parent, first, vec![child("B", "P1"), child("C", "P1")]);
        assert_eq!(ids(&second), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_merge_truncates_to_three() {
        let parent = pid("P1");
        let merged = merge_children(
            &parent,
            vec![child("A", "P1"), child("B", "P1"), child("C", "P1")],
            vec![child("D", "P1")],
        );
        assert_eq!(ids(&merged), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_merge_skips_parent_and_rewrites_source() {
        let parent = pid("P1");
        let merged = merge_children(&parent, vec![], vec![child("P1", "X"), child("A", "X")]);
        assert_eq!(ids(&merged), vec!["A"]);
        assert_eq!(merged[0].source_parent_id, parent);
    }

    #[tokio::test]
    async fn test_scenario_existing_entry_plus_new_search() {
        let store = InMemoryRelationshipStore::new();
        let parent = pid("P1");

        assert_ok!(store.merge("chat", &parent, vec![child("C1", "P1"), child("C2", "P1")]).await);
        let merged = store
            .merge(
                "chat",
                &parent,
                vec![child("C2", "P1"), child("C3", "P1"), child("C4", "P1")],
            )
            .await
            .unwrap();

        assert_eq!(ids(&merged), vec!["C1", "C2", "C3"]);
        assert_eq!(ids(&store.get("chat", &parent).await.unwrap()), vec!["C1", "C2", "C3"]);
    }

    #[tokio::test]
    async fn test_prefixed_lookup_hits_normalized_entry() {
        let store = InMemoryRelationshipStore::new();
        store.merge("chat", &pid("root-P1"), vec![child("C1", "P1")]).await.unwrap();

        let found = store.get("chat", &pid("corpus:P1")).await.unwrap();
        assert_eq!(ids(&found), vec!["C1"]);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let store = InMemoryRelationshipStore::new();
        let parent = pid("P1");
        store.merge("a", &parent, vec![child("C1", "P1")]).await.unwrap();

        assert!(store.get("b", &parent).await.unwrap().is_empty());
        assert_eq!(store.delete_conversation("a").await.unwrap(), 1);
        assert!(store.get("a", &parent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_many_skips_empty() {
        let store = InMemoryRelationshipStore::new();
        store.merge("chat", &pid("P1"), vec![child("C1", "P1")]).await.unwrap();

        let entries = store.get_many("chat", &[pid("P1"), pid("P2")]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(&pid("P1")));
    }
}

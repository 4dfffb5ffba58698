//! Redis-backed relationship store
//!
//! Layout:
//! - `{prefix}:rel:{chat}:{paper}` holds the JSON child list
//! - `{prefix}:rel:{chat}:index` is the set of parents written in a conversation

use super::{merge_children, storage_failure, RelationshipStore};
use crate::config::StoreConfig;
use crate::errors::{AppError, Result};
use crate::ids::PaperId;
use crate::metrics;
use crate::models::ChildPaper;
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::debug;

pub struct RedisRelationshipStore {
    client: Client,
    connection: RwLock<MultiplexedConnection>,
    key_prefix: String,
}

impl RedisRelationshipStore {
    /// Connect to Redis
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| AppError::Storage {
                message: format!("Failed to create Redis client: {}", e)
            })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            client,
            connection: RwLock::new(connection),
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn entry_key(&self, chat_id: &str, parent: &PaperId) -> String {
        format!("{}:rel:{}:{}", self.key_prefix, chat_id, parent)
    }

    fn index_key(&self, chat_id: &str) -> String {
        format!("{}:rel:{}:index", self.key_prefix, chat_id)
    }

    async fn read_entry(
        conn: &mut MultiplexedConnection,
        key: &str,
    ) -> Result<Vec<ChildPaper>> {
        let value: Option<String> = conn.get(key).await?;
        match value {
            Some(json) => serde_json::from_str(&json).map_err(|e| AppError::Storage {
                message: format!("Failed to parse stored relationships at '{}': {}", key, e),
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Open a fresh connection, used to recover after the shared one breaks
    pub async fn reconnect(&self) -> Result<()> {
        let fresh = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to reconnect to Redis: {}", e),
            })?;
        *self.connection.write().await = fresh;
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for RedisRelationshipStore {
    async fn get(&self, chat_id: &str, parent: &PaperId) -> Result<Vec<ChildPaper>> {
        let key = self.entry_key(chat_id, parent);
        let mut conn = self.connection.read().await.clone();

        let children = Self::read_entry(&mut conn, &key).await?;
        metrics::record_store_lookup(!children.is_empty(), self.backend_name());
        debug!(key = %key, count = children.len(), "Relationship lookup");
        Ok(children)
    }

    async fn merge(
        &self,
        chat_id: &str,
        parent: &PaperId,
        children: Vec<ChildPaper>,
    ) -> Result<Vec<ChildPaper>> {
        let key = self.entry_key(chat_id, parent);
        let index = self.index_key(chat_id);

        // Writers hold the lock across read-modify-write
        let mut conn = self.connection.write().await;

        let write = async {
            let existing = Self::read_entry(&mut conn, &key).await?;
            let merged = merge_children(parent, existing, children);
            let json = serde_json::to_string(&merged)?;

            let _: () = conn.set(&key, json).await?;
            let _: () = conn.sadd(&index, parent.as_str()).await?;
            Ok::<_, AppError>(merged)
        };

        match write.await {
            Ok(merged) => {
                debug!(key = %key, total = merged.len(), "Relationships merged");
                Ok(merged)
            }
            Err(e) => Err(storage_failure(self.backend_name(), chat_id, parent, e)),
        }
    }

    async fn delete_conversation(&self, chat_id: &str) -> Result<usize> {
        let index = self.index_key(chat_id);
        let mut conn = self.connection.write().await;

        let parents: Vec<String> = conn.smembers(&index).await?;
        let mut keys: Vec<String> = parents
            .iter()
            .map(|p| format!("{}:rel:{}:{}", self.key_prefix, chat_id, p))
            .collect();
        keys.push(index);

        let _: i64 = conn.del(keys).await?;
        debug!(chat_id, parents = parents.len(), "Conversation relationships deleted");
        Ok(parents.len())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.read().await.clone();
        if let Err(e) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            if let Err(reconnect_error) = self.reconnect().await {
                debug!(error = %reconnect_error, "Redis reconnect failed");
            }
            return Err(AppError::Storage {
                message: format!("Redis ping failed: {}", e),
            });
        }
        Ok(())
    }
}

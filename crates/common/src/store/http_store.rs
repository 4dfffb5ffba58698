//! Relationship store backed by the external relationship service
//!
//! Speaks the `/relationships` contract: `GET ?chatId&paperId` for reads,
//! `POST {chatId, paperId, childPapers}` for merges (the service caps and
//! de-duplicates), `DELETE ?chatId` for conversation removal.

use super::{merge_children, storage_failure, RelationshipStore};
use crate::errors::{AppError, Result};
use crate::ids::PaperId;
use crate::metrics;
use crate::models::{
    ChildPaper, RelationshipsResponse, SaveRelationshipsRequest, SaveRelationshipsResponse,
};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpRelationshipStore {
    client: reqwest::Client,
    base_url: String,
    max_retry_elapsed: Duration,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    #[serde(default)]
    deleted: usize,
}

impl HttpRelationshipStore {
    pub fn new(base_url: String, max_retry_elapsed_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retry_elapsed: Duration::from_millis(max_retry_elapsed_ms),
        })
    }

    fn url(&self) -> String {
        format!("{}/relationships", self.base_url)
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        }
    }

    /// Reads are idempotent, so transient failures are retried with backoff
    async fn fetch(&self, chat_id: &str, parent: &PaperId) -> Result<Vec<ChildPaper>> {
        let url = self.url();
        let url = &url;
        let query = [("chatId", chat_id), ("paperId", parent.as_str())];
        let query = &query;
        let client = &self.client;

        let response = retry(self.backoff_policy(), move || async move {
            let response = client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(AppError::from(e)))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(RelationshipsResponse::default());
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(AppError::Storage {
                    message: format!("Relationship service returned {}", status),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(AppError::Storage {
                    message: format!("Relationship service rejected lookup: {}", status),
                }));
            }

            response
                .json::<RelationshipsResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(AppError::from(e)))
        })
        .await?;

        Ok(response.child_papers)
    }
}

#[async_trait]
impl RelationshipStore for HttpRelationshipStore {
    async fn get(&self, chat_id: &str, parent: &PaperId) -> Result<Vec<ChildPaper>> {
        let children = self.fetch(chat_id, parent).await?;
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
        let request = SaveRelationshipsRequest {
            chat_id: chat_id.to_string(),
            paper_id: parent.clone(),
            child_papers: children.clone(),
        };

        let save = async {
            let response = self.client.post(self.url()).json(&request).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Storage {
                    message: format!("Relationship service returned {}: {}", status, body),
                });
            }
            let saved: SaveRelationshipsResponse = response.json().await?;
            Ok::<_, AppError>(saved)
        };

        let saved = save
            .await
            .map_err(|e| storage_failure(self.backend_name(), chat_id, parent, e))?;
        debug!(chat_id, paper_id = %parent, total = saved.total_children, "Relationships merged");

        // The service owns the merge; read back the authoritative entry.
        // The write already succeeded, so a failed read-back is not a failed save.
        match self.fetch(chat_id, parent).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                warn!(
                    chat_id,
                    paper_id = %parent,
                    error = %e,
                    "Read-back after save failed, using the submitted children"
                );
                Ok(merge_children(parent, Vec::new(), children))
            }
        }
    }

    async fn delete_conversation(&self, chat_id: &str) -> Result<usize> {
        let response = self
            .client
            .delete(self.url())
            .query(&[("chatId", chat_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Storage {
                message: format!("Relationship service returned {}", response.status()),
            });
        }

        let deleted: DeleteResponse = response.json().await?;
        Ok(deleted.deleted)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

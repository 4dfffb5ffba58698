//! Citation-network seed client
//!
//! `POST {base}/citation-network` with `{corpusId|paperId, depth, chatId}`.

use async_trait::async_trait;
use citeweave_common::config::SearchConfig;
use citeweave_common::errors::{AppError, Result};
use citeweave_common::models::{CitationNetwork, CitationNetworkPayload, CitationNetworkRequest};
use std::time::Duration;
use tracing::info;

/// Source of seed networks
#[async_trait]
pub trait CitationSource: Send + Sync {
    async fn fetch(&self, request: &CitationNetworkRequest) -> Result<CitationNetwork>;
}

pub struct CitationNetworkClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CitationNetworkClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CitationSource for CitationNetworkClient {
    async fn fetch(&self, request: &CitationNetworkRequest) -> Result<CitationNetwork> {
        if request.corpus_id.is_none() && request.paper_id.is_none() {
            return Err(AppError::Validation {
                message: "A corpusId or paperId is required to seed a citation network".to_string(),
                field: Some("paperId".to_string()),
            });
        }

        let mut builder = self
            .client
            .post(format!("{}/citation-network", self.base_url))
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        let payload: CitationNetworkPayload = response.json().await?;
        let network = CitationNetwork::parse(payload);
        info!(
            chat_id = %request.chat_id,
            nodes = network.nodes.len(),
            edges = network.edges.len(),
            "Citation network fetched"
        );
        Ok(network)
    }
}

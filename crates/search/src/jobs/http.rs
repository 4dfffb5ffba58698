//! HTTP transport to the paper-search backend
//!
//! - `POST {base}/jobs/{jobType}` with the job body, answering `{jobId}`
//! - `GET {base}/jobs/{jobId}`, answering `{status, results?, error?}`
//!
//! Result records are parsed one by one; a record that fails to parse is
//! skipped with a warning instead of failing the whole job.

use super::{JobBody, SearchBackend};
use async_trait::async_trait;
use citeweave_common::config::SearchConfig;
use citeweave_common::errors::{AppError, Result};
use citeweave_common::models::{parse_paper, JobStatus, JobType, Paper, SearchJob};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    #[serde(alias = "id")]
    job_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    status: JobStatus,
    #[serde(default)]
    job_type: Option<JobType>,
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpSearchBackend {
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

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Upstream {
            status: status.as_u16(),
            message: body,
        })
    }
}

/// Parse job results, dropping records that are not valid papers
fn parse_results(job_id: &str, values: Vec<Value>) -> Vec<Paper> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match parse_paper(value) {
            Ok(paper) => Some(paper),
            Err(e) => {
                warn!(job_id, index, error = %e, "Skipping unparseable search result");
                None
            }
        })
        .collect()
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn create_job(&self, job_type: JobType, body: &JobBody) -> Result<String> {
        let url = format!("{}/jobs/{}", self.base_url, job_type.as_str());

        let response = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        let created: CreateJobResponse = Self::check(response).await?.json().await?;
        Ok(created.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<SearchJob> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let status: JobStatusResponse = Self::check(response).await?.json().await?;

        let results = match (status.status, status.results) {
            (JobStatus::Success, Some(values)) => Some(parse_results(job_id, values)),
            (JobStatus::Success, None) => Some(Vec::new()),
            _ => None,
        };

        Ok(SearchJob {
            id: job_id.to_string(),
            job_type: status.job_type,
            status: status.status,
            results,
            error: status.error,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

//! Search job types

use super::paper::Paper;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of asynchronous search job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    KeywordSearch,
    QuerySearch,
    CombinedSearch,
}

impl JobType {
    /// Path segment used by the job creation endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::KeywordSearch => "keywordSearch",
            JobType::QuerySearch => "querySearch",
            JobType::CombinedSearch => "combinedSearch",
        }
    }

    pub fn needs_phrases(&self) -> bool {
        matches!(self, JobType::KeywordSearch | JobType::CombinedSearch)
    }

    pub fn needs_query(&self) -> bool {
        matches!(self, JobType::QuerySearch | JobType::CombinedSearch)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Success,
    Error,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

/// Snapshot of a search job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchJob {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    pub status: JobStatus,
    /// Present only when `status` is `success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Paper>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchJob {
    pub fn pending(id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            job_type: None,
            status,
            results: None,
            error: None,
        }
    }
}

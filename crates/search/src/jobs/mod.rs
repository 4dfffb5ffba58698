//! Asynchronous search-job protocol
//!
//! A job is created once, then observed by polling until it reaches a
//! terminal status or the attempt budget of its polling profile runs
//! out. Running out of attempts is a client-side timeout, reported as
//! [`AppError::SearchTimeout`] and never confused with a failed job.

mod http;
mod request;
mod scripted;

pub use http::HttpSearchBackend;
pub use request::{
    derive_query, infer_job_type, normalize_phrases, pad_phrases, validate_job, JobBody,
    JobRequest, SearchBody, SearchFilters, MAX_PHRASES, MAX_QUERY_CHARS, MIN_QUERY_CHARS,
};
pub use scripted::{ScriptStep, ScriptedSearchBackend};

use async_trait::async_trait;
use citeweave_common::config::{PollProfileSettings, PollingConfig};
use citeweave_common::errors::{AppError, Result};
use citeweave_common::metrics;
use citeweave_common::models::{JobStatus, JobType, Paper, SearchJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Transport to the paper-search backend
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Submit a job and return its identifier
    async fn create_job(&self, job_type: JobType, body: &JobBody) -> Result<String>;

    /// One status check
    async fn job_status(&self, job_id: &str) -> Result<SearchJob>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Which polling profile a job runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Production,
    Simulated,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Production => "production",
            ProfileKind::Simulated => "simulated",
        }
    }
}

/// Attempt budget and inter-poll delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollProfile {
    pub kind: ProfileKind,
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollProfile {
    fn from_settings(kind: ProfileKind, settings: &PollProfileSettings) -> Self {
        Self {
            kind,
            max_attempts: settings.max_attempts.max(1),
            interval: settings.interval(),
        }
    }

    /// Longest time a job can be awaited under this profile
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Creates search jobs and waits for them
pub struct JobClient {
    backend: Arc<dyn SearchBackend>,
    production: PollProfile,
    simulated: PollProfile,
    simulated_prefixes: Vec<String>,
    force_simulated: bool,
}

impl JobClient {
    pub fn new(backend: Arc<dyn SearchBackend>, polling: &PollingConfig, force_simulated: bool) -> Self {
        Self {
            backend,
            production: PollProfile::from_settings(ProfileKind::Production, &polling.production),
            simulated: PollProfile::from_settings(ProfileKind::Simulated, &polling.simulated),
            simulated_prefixes: polling.simulated_job_prefixes.clone(),
            force_simulated,
        }
    }

    /// Profile for a job: accelerated in simulated mode or for simulated job ids
    pub fn profile_for(&self, job_id: &str) -> PollProfile {
        let simulated_id = self
            .simulated_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && job_id.starts_with(prefix.as_str()));

        if self.force_simulated || simulated_id {
            self.simulated
        } else {
            self.production
        }
    }

    /// The profile with the longest budget, used to size expansion locks
    pub fn longest_budget(&self) -> Duration {
        self.production.budget().max(self.simulated.budget())
    }

    /// Validate and submit a job
    pub async fn create(
        &self,
        job_type: JobType,
        body: &SearchBody,
        filters: &SearchFilters,
    ) -> Result<String> {
        validate_job(job_type, body, filters)?;

        let wire = JobBody::new(job_type, body, filters);
        let job_id = self.backend.create_job(job_type, &wire).await?;

        info!(
            job_id = %job_id,
            job_type = %job_type,
            backend = self.backend.name(),
            profile = self.profile_for(&job_id).kind.as_str(),
            "Search job created"
        );
        Ok(job_id)
    }

    /// Single status check
    pub async fn poll(&self, job_id: &str) -> Result<SearchJob> {
        let job = self.backend.job_status(job_id).await?;
        let job_type = job.job_type.map(|t| t.as_str()).unwrap_or("unknown");
        metrics::record_job_poll(job_type, job.status.as_str());
        Ok(job)
    }

    /// Poll until the job succeeds, fails, or the attempt budget runs out.
    ///
    /// Each poll is preceded by one interval of sleep, so a job that succeeds
    /// on poll `n` returns after `n` intervals.
    #[instrument(skip(self), fields(profile = tracing::field::Empty))]
    pub async fn await_completion(&self, job_id: &str) -> Result<Vec<Paper>> {
        let profile = self.profile_for(job_id);
        tracing::Span::current().record("profile", profile.kind.as_str());
        let started = Instant::now();

        for attempt in 1..=profile.max_attempts {
            tokio::time::sleep(profile.interval).await;

            let job = match self.poll(job_id).await {
                Ok(job) => job,
                // A flaky status check still counts toward the budget
                Err(e) if e.is_server_error() => {
                    warn!(job_id, attempt, error = %e, "Job status check failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!(job_id, attempt, status = job.status.as_str(), "Job status");

            match job.status {
                JobStatus::Success => {
                    let results = job.results.unwrap_or_default();
                    let waited = started.elapsed();
                    metrics::record_job_outcome(waited.as_secs_f64(), profile.kind.as_str(), "success");
                    info!(job_id, attempt, results = results.len(), "Search job succeeded");
                    return Ok(results);
                }
                JobStatus::Error => {
                    metrics::record_job_outcome(
                        started.elapsed().as_secs_f64(),
                        profile.kind.as_str(),
                        "error",
                    );
                    let message = job
                        .error
                        .unwrap_or_else(|| "Search backend reported an error".to_string());
                    warn!(job_id, attempt, error = %message, "Search job failed");
                    return Err(AppError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }
        }

        metrics::record_job_outcome(started.elapsed().as_secs_f64(), profile.kind.as_str(), "timeout");
        warn!(job_id, attempts = profile.max_attempts, "Search job still pending, giving up");
        Err(AppError::SearchTimeout {
            job_id: job_id.to_string(),
            attempts: profile.max_attempts,
        })
    }

    /// Create a job and wait for its results
    pub async fn run(
        &self,
        job_type: JobType,
        body: &SearchBody,
        filters: &SearchFilters,
    ) -> Result<Vec<Paper>> {
        let job_id = self.create(job_type, body, filters).await?;
        self.await_completion(&job_id).await
    }
}

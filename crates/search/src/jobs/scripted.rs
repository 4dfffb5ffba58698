//! Scripted search backend for tests and offline development
//!
//! Every job created replays the same script of status responses; the
//! final step repeats once the script is exhausted. Created jobs and poll
//! counts are recorded for assertions.

use super::{JobBody, SearchBackend};
use async_trait::async_trait;
use citeweave_common::errors::{AppError, Result};
use citeweave_common::models::{JobStatus, JobType, Paper, SearchJob};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted status response
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Pending(JobStatus),
    Succeed(Vec<Paper>),
    Fail(String),
    /// Status check itself fails with an upstream error
    Unavailable,
}

pub struct ScriptedSearchBackend {
    job_prefix: String,
    steps: Mutex<Vec<ScriptStep>>,
    created: Mutex<Vec<(JobType, JobBody)>>,
    polls: Mutex<HashMap<String, usize>>,
    counter: AtomicUsize,
}

impl ScriptedSearchBackend {
    pub fn new(job_prefix: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        Self {
            job_prefix: job_prefix.into(),
            steps: Mutex::new(steps),
            created: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        }
    }

    /// Jobs report `processing` for `pending_polls` checks, then succeed
    pub fn succeeding_after(job_prefix: &str, pending_polls: usize, results: Vec<Paper>) -> Self {
        let mut steps = vec![ScriptStep::Pending(JobStatus::Processing); pending_polls];
        steps.push(ScriptStep::Succeed(results));
        Self::new(job_prefix, steps)
    }

    pub fn never_finishing(job_prefix: &str) -> Self {
        Self::new(job_prefix, vec![ScriptStep::Pending(JobStatus::Processing)])
    }

    pub fn failing(job_prefix: &str, message: &str) -> Self {
        Self::new(job_prefix, vec![ScriptStep::Fail(message.to_string())])
    }

    /// Replace the script for jobs polled from now on
    pub fn set_steps(&self, steps: Vec<ScriptStep>) {
        if let Ok(mut current) = self.steps.lock() {
            *current = steps;
        }
    }

    pub fn created_jobs(&self) -> Vec<(JobType, JobBody)> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn poll_count(&self, job_id: &str) -> usize {
        self.polls
            .lock()
            .ok()
            .and_then(|polls| polls.get(job_id).copied())
            .unwrap_or(0)
    }

    pub fn total_polls(&self) -> usize {
        self.polls.lock().map(|polls| polls.values().sum()).unwrap_or(0)
    }

    fn lock_error() -> AppError {
        AppError::Internal {
            message: "scripted backend state poisoned".to_string(),
        }
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearchBackend {
    async fn create_job(&self, job_type: JobType, body: &JobBody) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("{}{}", self.job_prefix, n);

        self.created
            .lock()
            .map_err(|_| Self::lock_error())?
            .push((job_type, body.clone()));
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<SearchJob> {
        let index = {
            let mut polls = self.polls.lock().map_err(|_| Self::lock_error())?;
            let count = polls.entry(job_id.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        let step = {
            let steps = self.steps.lock().map_err(|_| Self::lock_error())?;
            steps
                .get(index)
                .or_else(|| steps.last())
                .cloned()
                .unwrap_or(ScriptStep::Pending(JobStatus::Queued))
        };

        let job = match step {
            ScriptStep::Pending(status) => SearchJob::pending(job_id, status),
            ScriptStep::Succeed(results) => SearchJob {
                results: Some(results),
                ..SearchJob::pending(job_id, JobStatus::Success)
            },
            ScriptStep::Fail(message) => SearchJob {
                error: Some(message),
                ..SearchJob::pending(job_id, JobStatus::Error)
            },
            ScriptStep::Unavailable => {
                return Err(AppError::Upstream {
                    status: 503,
                    message: "search backend unavailable".to_string(),
                })
            }
        };
        Ok(job)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

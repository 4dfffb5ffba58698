//! CiteWeave Search Library
//!
//! Everything that talks to the paper-search backend or ranks its output:
//! - Search jobs: request resolution and validation, creation, polling
//! - Citation-network seeding
//! - Top-k candidate selection

pub mod jobs;
pub mod network;
pub mod ranking;

pub use jobs::{
    HttpSearchBackend, JobClient, JobRequest, PollProfile, ProfileKind, ScriptStep,
    ScriptedSearchBackend, SearchBackend, SearchBody, SearchFilters,
};
pub use network::{CitationNetworkClient, CitationSource};
pub use ranking::{Candidate, TopKSelector};

use citeweave_common::config::AppConfig;
use citeweave_common::errors::Result;
use std::sync::Arc;

/// Build a job client against the configured HTTP backend
pub fn create_job_client(config: &AppConfig) -> Result<JobClient> {
    let backend = Arc::new(HttpSearchBackend::new(&config.search)?);
    Ok(JobClient::new(backend, &config.polling, config.search.simulated))
}

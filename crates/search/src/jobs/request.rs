//! Search job requests
//!
//! [`JobRequest`] is what a caller asks for (all parts optional).
//! [`JobRequest::resolve`] turns it into a concrete job type, body and
//! filter set using the anchor paper for missing material, and
//! [`validate_job`] checks the result before anything goes on the wire.

use citeweave_common::errors::{AppError, Result};
use citeweave_common::models::{JobType, Paper};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use validator::{Validate, ValidationErrors};

pub const MIN_PHRASES: usize = 1;
pub const MAX_PHRASES: usize = 10;
/// Keyword jobs are rejected by the backend below this many phrases
pub const PADDED_PHRASES: usize = 3;
pub const MIN_QUERY_CHARS: usize = 50;
pub const MAX_QUERY_CHARS: usize = 5000;

pub const QUARTILES: &[&str] = &["Q1", "Q2", "Q3", "Q4"];
pub const PUBLICATION_TYPES: &[&str] = &["journal", "book series", "conference"];
pub const RESULT_LIMITS: &[u32] = &[100, 200, 300];

fn sort_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*:(asc|desc)$").expect("static sort pattern"))
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{4})(?::(\d{4}))?$").expect("static year pattern"))
}

/// Optional search filters, flattened into the job body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields_of_study: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub min_citation_count: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_access_pdf: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloadable: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 4))]
    pub quartile_ranking: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 3))]
    pub publication_types: Option<Vec<String>>,

    /// `field:asc` or `field:desc`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// `YYYY` or `YYYY:YYYY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SearchFilters {
    /// Enumerated and pattern checks that the derive cannot express
    fn check_values(&self) -> Result<()> {
        if let Some(quartiles) = &self.quartile_ranking {
            if let Some(bad) = quartiles.iter().find(|q| !QUARTILES.contains(&q.as_str())) {
                return Err(invalid("quartileRanking", format!("Unknown quartile '{}'", bad)));
            }
        }

        if let Some(types) = &self.publication_types {
            if let Some(bad) = types.iter().find(|t| !PUBLICATION_TYPES.contains(&t.as_str())) {
                return Err(invalid("publicationTypes", format!("Unknown publication type '{}'", bad)));
            }
        }

        if let Some(sort) = &self.sort {
            if !sort_pattern().is_match(sort) {
                return Err(invalid("sort", format!("Sort '{}' must look like field:asc or field:desc", sort)));
            }
        }

        if let Some(year) = &self.year {
            let captures = year_pattern()
                .captures(year)
                .ok_or_else(|| invalid("year", format!("Year '{}' must be YYYY or YYYY:YYYY", year)))?;
            if let (Some(start), Some(end)) = (captures.get(1), captures.get(2)) {
                if start.as_str() > end.as_str() {
                    return Err(invalid("year", format!("Year range '{}' starts after it ends", year)));
                }
            }
        }

        if let Some(limit) = self.limit {
            if !RESULT_LIMITS.contains(&limit) {
                return Err(invalid("limit", format!("Limit must be one of 100, 200, 300 (got {})", limit)));
            }
        }

        Ok(())
    }
}

/// Search material for a job: phrases, a query, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 10))]
    pub phrases: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 50, max = 5000))]
    pub query: Option<String>,
}

/// Body posted to `/jobs/{jobType}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrases: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(flatten)]
    pub filters: SearchFilters,
}

impl JobBody {
    /// Keep only the material the job type uses
    pub fn new(job_type: JobType, body: &SearchBody, filters: &SearchFilters) -> Self {
        Self {
            phrases: body.phrases.clone().filter(|_| job_type.needs_phrases()),
            query: body.query.clone().filter(|_| job_type.needs_query()),
            filters: filters.clone(),
        }
    }
}

/// What a caller asks to search for; every part may be left out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobRequest {
    pub job_type: Option<JobType>,
    pub phrases: Vec<String>,
    pub query: Option<String>,
    pub filters: SearchFilters,
}

impl JobRequest {
    /// Fill in missing material from the anchor paper and pick the job type
    pub fn resolve(&self, anchor: Option<&Paper>) -> Result<(JobType, SearchBody, SearchFilters)> {
        let mut phrases = normalize_phrases(&self.phrases);

        let query = self
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .or_else(|| anchor.and_then(derive_query));

        let job_type = match self.job_type {
            Some(job_type) => job_type,
            None => infer_job_type(!phrases.is_empty(), query.is_some())?,
        };

        if job_type.needs_phrases() && !phrases.is_empty() {
            if let Some(anchor) = anchor {
                pad_phrases(&mut phrases, anchor);
            }
        }

        let body = SearchBody {
            phrases: Some(phrases).filter(|_| job_type.needs_phrases()),
            query: query.filter(|_| job_type.needs_query()),
        };

        Ok((job_type, body, self.filters.clone()))
    }
}

/// Both kinds of material make a combined job, either one its own kind
pub fn infer_job_type(has_phrases: bool, has_query: bool) -> Result<JobType> {
    match (has_phrases, has_query) {
        (true, true) => Ok(JobType::CombinedSearch),
        (true, false) => Ok(JobType::KeywordSearch),
        (false, true) => Ok(JobType::QuerySearch),
        (false, false) => Err(AppError::Validation {
            message: "Provide search phrases or a query of at least 50 characters".to_string(),
            field: Some("phrases".to_string()),
        }),
    }
}

/// Trim, drop empties, de-duplicate case-insensitively, cap at ten
pub fn normalize_phrases(phrases: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.to_lowercase()))
        .take(MAX_PHRASES)
        .map(str::to_string)
        .collect()
}

/// Top up to three phrases from the anchor's title, fields and publication types
pub fn pad_phrases(phrases: &mut Vec<String>, anchor: &Paper) {
    let mut seen: HashSet<String> = phrases.iter().map(|p| p.to_lowercase()).collect();

    let material = std::iter::once(anchor.title.as_str())
        .chain(anchor.fields_of_study.iter().map(String::as_str))
        .chain(anchor.publication_types.iter().map(String::as_str));

    for phrase in material {
        if phrases.len() >= PADDED_PHRASES {
            break;
        }
        let phrase = phrase.trim();
        if !phrase.is_empty() && seen.insert(phrase.to_lowercase()) {
            phrases.push(phrase.to_string());
        }
    }
}

/// Query text from the anchor: TLDR, else abstract, else title and abstract
pub fn derive_query(anchor: &Paper) -> Option<String> {
    let title_and_abstract = anchor
        .abstract_text
        .as_ref()
        .map(|abstract_text| format!("{} {}", anchor.title.trim(), abstract_text.trim()));

    [anchor.tldr.clone(), anchor.abstract_text.clone(), title_and_abstract]
        .into_iter()
        .flatten()
        .map(|text| truncate_chars(text.trim(), MAX_QUERY_CHARS))
        .find(|text| text.chars().count() >= MIN_QUERY_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Check a job before creation; nothing here touches the network
pub fn validate_job(job_type: JobType, body: &SearchBody, filters: &SearchFilters) -> Result<()> {
    if job_type.needs_phrases() && body.phrases.as_ref().map_or(true, |p| p.is_empty()) {
        return Err(invalid(
            "phrases",
            format!("{} requires {}-{} phrases", job_type, MIN_PHRASES, MAX_PHRASES),
        ));
    }

    if job_type.needs_query() && body.query.as_ref().map_or(true, |q| q.trim().is_empty()) {
        return Err(invalid(
            "query",
            format!("{} requires a query of {}-{} characters", job_type, MIN_QUERY_CHARS, MAX_QUERY_CHARS),
        ));
    }

    body.validate().map_err(validation_error)?;
    filters.validate().map_err(validation_error)?;
    filters.check_values()
}

fn invalid(field: &str, message: String) -> AppError {
    AppError::Validation {
        message,
        field: Some(field.to_string()),
    }
}

fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|k| k.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

//! Paper record and its parsing boundary
//!
//! Upstream payloads are loosely shaped: ids may be numbers or strings,
//! authors may be plain names or objects, `tldr` may be nested. They are
//! read into [`RawPaper`] and converted exactly once into [`Paper`].

use crate::errors::AppError;
use crate::ids::PaperId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalize a score to the canonical 0-1 range.
///
/// Values in (1, 100] are treated as percentages, anything larger clamps
/// to 1.0, negatives and NaN become 0.0.
pub fn normalize_score(raw: f64) -> f64 {
    if raw.is_nan() || raw <= 0.0 {
        0.0
    } else if raw <= 1.0 {
        raw
    } else if raw <= 100.0 {
        raw / 100.0
    } else {
        1.0
    }
}

/// Immutable paper record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPaper")]
pub struct Paper {
    #[serde(rename = "paperId")]
    pub id: PaperId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_id: Option<PaperId>,

    pub title: String,

    /// Relevance score, always 0-1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields_of_study: Vec<String>,

    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tldr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub influential_citation_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub publication_types: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_access_pdf: Option<String>,
}

impl Paper {
    /// Minimal record carrying only identity and title
    pub fn minimal(id: PaperId, title: impl Into<String>) -> Self {
        Self {
            id,
            corpus_id: None,
            title: title.into(),
            score: None,
            authors: Vec::new(),
            year: None,
            fields_of_study: Vec::new(),
            abstract_text: None,
            tldr: None,
            citation_count: None,
            influential_citation_count: None,
            reference_count: None,
            venue: None,
            publication_types: Vec::new(),
            url: None,
            open_access_pdf: None,
        }
    }

    /// Whether this record describes the paper with the given identifier
    pub fn matches(&self, id: &PaperId) -> bool {
        &self.id == id || self.corpus_id.as_ref() == Some(id)
    }

    /// Score or 0.0 when absent
    pub fn score_or_zero(&self) -> f64 {
        self.score.unwrap_or(0.0)
    }

    /// Title for display, falling back to the identifier
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            self.id.as_str()
        } else {
            &self.title
        }
    }
}

/// Lenient wire shape of a paper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPaper {
    #[serde(default)]
    pub paper_id: Option<Value>,
    #[serde(default)]
    pub corpus_id: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub authors: Option<Vec<AuthorField>>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub fields_of_study: Option<Vec<String>>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub tldr: Option<TextField>,
    #[serde(default)]
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub influential_citation_count: Option<u64>,
    #[serde(default)]
    pub reference_count: Option<u64>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub publication_types: Option<Vec<String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub open_access_pdf: Option<UrlField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthorField {
    Name(String),
    Object { name: Option<String> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    Text(String),
    Object { text: Option<String> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UrlField {
    Url(String),
    Object { url: Option<String> },
}

fn id_from_value(value: &Option<Value>) -> Option<PaperId> {
    match value.as_ref()? {
        Value::String(s) => PaperId::normalize(s).ok(),
        Value::Number(n) => PaperId::normalize(&n.to_string()).ok(),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl TryFrom<RawPaper> for Paper {
    type Error = AppError;

    fn try_from(raw: RawPaper) -> Result<Self, Self::Error> {
        let paper_id = id_from_value(&raw.paper_id);
        let corpus_id = id_from_value(&raw.corpus_id);
        let fallback_id = id_from_value(&raw.id);

        let id = paper_id
            .clone()
            .or_else(|| corpus_id.clone())
            .or(fallback_id)
            .ok_or_else(|| AppError::Validation {
                message: "Paper record has no identifier".to_string(),
                field: Some("paperId".to_string()),
            })?;

        let corpus_id = corpus_id.filter(|c| c != &id);

        let authors = raw
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| match a {
                AuthorField::Name(name) => Some(name),
                AuthorField::Object { name } => name,
            })
            .filter(|name| !name.trim().is_empty())
            .collect();

        let tldr = raw.tldr.and_then(|t| match t {
            TextField::Text(text) => Some(text),
            TextField::Object { text } => text,
        });

        let open_access_pdf = raw.open_access_pdf.and_then(|u| match u {
            UrlField::Url(url) => Some(url),
            UrlField::Object { url } => url,
        });

        Ok(Paper {
            id,
            corpus_id,
            title: raw.title.unwrap_or_default().trim().to_string(),
            score: raw.score.map(normalize_score),
            authors,
            year: raw.year,
            fields_of_study: raw.fields_of_study.unwrap_or_default(),
            abstract_text: non_empty(raw.abstract_text),
            tldr: non_empty(tldr),
            citation_count: raw.citation_count,
            influential_citation_count: raw.influential_citation_count,
            reference_count: raw.reference_count,
            venue: non_empty(raw.venue),
            publication_types: raw.publication_types.unwrap_or_default(),
            url: raw.url,
            open_access_pdf: non_empty(open_access_pdf),
        })
    }
}

/// Parse one paper from an arbitrary JSON value
pub fn parse_paper(value: Value) -> Result<Paper, AppError> {
    let raw: RawPaper = serde_json::from_value(value)?;
    Paper::try_from(raw)
}

//! Per-node annotation state
//!
//! A node may show up to four keyword tags (a panel beside the node) and
//! up to four metadata fields of its paper (a panel below or above it).

use citeweave_common::errors::{AppError, Result};
use citeweave_common::models::Paper;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MAX_KEYWORD_TAGS: usize = 4;
pub const MAX_METADATA_FIELDS: usize = 4;

/// Paper fields that can be pinned to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataField {
    Authors,
    Year,
    Venue,
    CitationCount,
    FieldsOfStudy,
    PublicationTypes,
    Tldr,
    Abstract,
}

impl MetadataField {
    pub fn label(&self) -> &'static str {
        match self {
            MetadataField::Authors => "Authors",
            MetadataField::Year => "Year",
            MetadataField::Venue => "Venue",
            MetadataField::CitationCount => "Citations",
            MetadataField::FieldsOfStudy => "Fields",
            MetadataField::PublicationTypes => "Type",
            MetadataField::Tldr => "TL;DR",
            MetadataField::Abstract => "Abstract",
        }
    }

    /// Text shown for this field, `None` when the paper lacks it
    pub fn render(&self, paper: &Paper) -> Option<String> {
        let join = |values: &[String]| Some(values.join(", ")).filter(|s| !s.is_empty());
        match self {
            MetadataField::Authors => join(paper.authors.as_slice()),
            MetadataField::Year => paper.year.map(|y| y.to_string()),
            MetadataField::Venue => paper.venue.clone(),
            MetadataField::CitationCount => paper.citation_count.map(|c| c.to_string()),
            MetadataField::FieldsOfStudy => join(paper.fields_of_study.as_slice()),
            MetadataField::PublicationTypes => join(paper.publication_types.as_slice()),
            MetadataField::Tldr => paper.tldr.clone(),
            MetadataField::Abstract => paper.abstract_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    #[serde(default)]
    pub keyword_tags: Vec<String>,
    #[serde(default)]
    pub metadata_fields: Vec<MetadataField>,
}

impl Annotations {
    /// Clean up and check the selection; more than four of either kind is rejected
    pub fn new(keyword_tags: Vec<String>, metadata_fields: Vec<MetadataField>) -> Result<Self> {
        let mut seen = HashSet::new();
        let keyword_tags: Vec<String> = keyword_tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
            .collect();

        let mut seen_fields = HashSet::new();
        let metadata_fields: Vec<MetadataField> = metadata_fields
            .into_iter()
            .filter(|f| seen_fields.insert(*f))
            .collect();

        if keyword_tags.len() > MAX_KEYWORD_TAGS {
            return Err(AppError::Validation {
                message: format!("At most {} keyword tags per node", MAX_KEYWORD_TAGS),
                field: Some("keywordTags".to_string()),
            });
        }
        if metadata_fields.len() > MAX_METADATA_FIELDS {
            return Err(AppError::Validation {
                message: format!("At most {} metadata fields per node", MAX_METADATA_FIELDS),
                field: Some("metadataFields".to_string()),
            });
        }

        Ok(Self {
            keyword_tags,
            metadata_fields,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.keyword_tags.is_empty() && self.metadata_fields.is_empty()
    }

    /// Metadata lines for a paper, skipping fields it does not have
    pub fn metadata_lines(&self, paper: &Paper) -> Vec<(MetadataField, String)> {
        self.metadata_fields
            .iter()
            .filter_map(|field| field.render(paper).map(|text| (*field, text)))
            .collect()
    }
}

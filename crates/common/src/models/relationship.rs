//! Relationship store entries and the persistence wire contract

use super::paper::Paper;
use crate::ids::PaperId;
use serde::{Deserialize, Serialize};

/// Child descriptor stored under a parent paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPaper {
    pub id: PaperId,
    pub title: String,
    pub source_parent_id: PaperId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper: Option<Paper>,
}

impl ChildPaper {
    pub fn from_paper(parent: &PaperId, paper: Paper) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            source_parent_id: parent.clone(),
            paper: Some(paper),
        }
    }

    /// Full cached record, or a minimal one built from id and title
    pub fn to_paper(&self) -> Paper {
        match &self.paper {
            Some(paper) if paper.matches(&self.id) => paper.clone(),
            _ => Paper::minimal(self.id.clone(), self.title.clone()),
        }
    }
}

/// `GET /relationships` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipsResponse {
    #[serde(default)]
    pub child_papers: Vec<ChildPaper>,
}

/// `GET /relationships` query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipsQuery {
    pub chat_id: String,
    pub paper_id: PaperId,
}

/// `POST /relationships` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRelationshipsRequest {
    pub chat_id: String,
    pub paper_id: PaperId,
    pub child_papers: Vec<ChildPaper>,
}

/// `POST /relationships` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRelationshipsResponse {
    pub total_children: usize,
}

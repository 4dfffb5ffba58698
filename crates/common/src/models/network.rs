//! Citation-network seed payloads
//!
//! The seed endpoint returns a flat node/edge list with one node flagged
//! as root. [`CitationNetwork::parse`] is the single place where node
//! payloads are checked against their own identifiers.

use super::paper::{normalize_score, parse_paper, Paper};
use crate::ids::PaperId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Request body for the citation-network seed endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationNetworkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_id: Option<String>,
    #[serde(default = "default_depth")]
    pub depth: u32,
    pub chat_id: String,
}

fn default_depth() -> u32 { 1 }

/// Wire shape of the seed response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationNetworkPayload {
    #[serde(default)]
    pub paper: Option<Value>,
    #[serde(default)]
    pub citation_network: NetworkPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkPayload {
    #[serde(default)]
    pub nodes: Vec<NetworkNodePayload>,
    #[serde(default)]
    pub edges: Vec<NetworkEdge>,
    #[serde(default)]
    pub stats: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkNodePayload {
    pub id: String,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub node_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
}

/// Parsed network node
#[derive(Debug, Clone)]
pub struct NetworkNode {
    /// Node id as it appears in edges
    pub raw_id: String,
    /// Normalized paper id derived from the node id
    pub paper_id: Option<PaperId>,
    pub is_root: bool,
    pub label: Option<String>,
    /// Node-level score, already normalized
    pub score: Option<f64>,
    /// The node's own paper payload, present only if it matched `paper_id`
    pub paper: Option<Paper>,
    pub node_type: Option<String>,
}

impl NetworkNode {
    /// Node score, else the node's own paper score, else zero
    pub fn rank_score(&self) -> f64 {
        self.score
            .or_else(|| self.paper.as_ref().and_then(|p| p.score))
            .unwrap_or(0.0)
    }
}

/// Parsed citation network
#[derive(Debug, Clone, Default)]
pub struct CitationNetwork {
    pub root_paper: Option<Paper>,
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub stats: Option<Value>,
}

impl CitationNetwork {
    /// Parse a seed payload, dropping node data that does not belong to its node
    pub fn parse(payload: CitationNetworkPayload) -> Self {
        let root_paper = payload.paper.and_then(|value| match parse_paper(value) {
            Ok(paper) => Some(paper),
            Err(e) => {
                warn!(error = %e, "Discarding unparseable root paper payload");
                None
            }
        });

        let nodes = payload
            .citation_network
            .nodes
            .into_iter()
            .map(parse_node)
            .collect();

        Self {
            root_paper,
            nodes,
            edges: payload.citation_network.edges,
            stats: payload.citation_network.stats,
        }
    }

    pub fn root(&self) -> Option<&NetworkNode> {
        self.nodes.iter().find(|n| n.is_root)
    }
}

fn parse_node(node: NetworkNodePayload) -> NetworkNode {
    let paper_id = PaperId::normalize(&node.id).ok();

    let paper = node.data.and_then(|value| match parse_paper(value) {
        Ok(paper) => Some(paper),
        Err(e) => {
            warn!(node_id = %node.id, error = %e, "Discarding unparseable node payload");
            None
        }
    });

    // Node data must describe the node itself; anything else is dropped
    let paper = match (paper, &paper_id) {
        (Some(paper), Some(id)) if paper.matches(id) => Some(paper),
        (Some(paper), _) => {
            warn!(
                node_id = %node.id,
                payload_paper_id = %paper.id,
                "Node payload belongs to a different paper, dropping it"
            );
            None
        }
        (None, _) => None,
    };

    NetworkNode {
        raw_id: node.id,
        paper_id,
        is_root: node.is_root,
        label: node.label,
        score: node.score.map(normalize_score),
        paper,
        node_type: node.node_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_drops_mismatched_data() {
        let payload: CitationNetworkPayload = serde_json::from_value(json!({
            "paper": {"paperId": "P0", "title": "Root"},
            "citationNetwork": {
                "nodes": [
                    {"id": "root-P0", "isRoot": true, "data": {"paperId": "P0", "title": "Root"}},
                    {"id": "paper-P1", "score": 80, "data": {"paperId": "P1", "title": "One"}},
                    {"id": "paper-P2", "data": {"paperId": "P0", "title": "Wrong"}}
                ],
                "edges": [{"source": "root-P0", "target": "paper-P1"}]
            }
        }))
        .unwrap();

        let network = CitationNetwork::parse(payload);

        assert_eq!(network.root().unwrap().raw_id, "root-P0");
        assert_eq!(network.nodes[1].score, Some(0.8));
        assert!(network.nodes[1].paper.is_some());
        assert!(network.nodes[2].paper.is_none());
        assert_eq!(network.nodes[2].paper_id.as_ref().unwrap().as_str(), "P2");
    }

    #[test]
    fn test_rank_score_never_borrows() {
        let node = NetworkNode {
            raw_id: "x".into(),
            paper_id: None,
            is_root: false,
            label: None,
            score: None,
            paper: None,
            node_type: None,
        };
        assert_eq!(node.rank_score(), 0.0);
    }
}

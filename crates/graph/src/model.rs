//! Incremental citation tree
//!
//! Nodes live in an arena addressed by [`NodeId`]. Parent links are plain
//! ids used for lookup; ownership is the arena. A node's children are
//! only ever filled by an explicit expansion (or store hydration) of that
//! node, never recursively.
//!
//! Invariants held after every mutation:
//! - at most [`MAX_CHILDREN`] real children per node
//! - no child carries its parent's paper id
//! - no two children of a node share a paper id
//! - a node's paper payload always describes the node's own paper

use crate::annotations::Annotations;
use citeweave_common::errors::{AppError, Result};
use citeweave_common::ids::PaperId;
use citeweave_common::models::{ChildPaper, CitationNetwork, NetworkNode, Paper};
use citeweave_common::store::RelationshipStore;
use citeweave_common::MAX_CHILDREN;
use citeweave_search::TopKSelector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    /// `None` only for placeholders
    pub paper_id: Option<PaperId>,
    pub label: String,
    pub depth: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expandable: bool,
    /// Children are materialized but hidden
    pub collapsed: bool,
    /// Speculative child shown while an expansion is pending
    pub placeholder: bool,
    /// Stored children have been merged in
    pub hydrated: bool,
    pub annotations: Annotations,
    #[serde(skip_serializing_if = "Option::is_none")]
    paper: Option<Paper>,
}

impl GraphNode {
    fn new(id: NodeId, paper: Paper, depth: usize, parent: Option<NodeId>) -> Self {
        Self {
            id,
            paper_id: Some(paper.id.clone()),
            label: paper.display_title().to_string(),
            depth,
            parent,
            children: Vec::new(),
            expandable: true,
            collapsed: false,
            placeholder: false,
            hydrated: false,
            annotations: Annotations::default(),
            paper: Some(paper),
        }
    }

    pub fn has_paper(&self) -> bool {
        self.paper.is_some()
    }
}

/// What happened to a batch of candidate children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandOutcome {
    pub added: Vec<NodeId>,
    pub skipped_duplicates: usize,
    pub skipped_over_cap: usize,
}

#[derive(Debug, Clone)]
pub struct GraphModel {
    nodes: Vec<Option<GraphNode>>,
    root: NodeId,
}

impl GraphModel {
    /// Single-node graph around a root paper
    pub fn with_root(paper: Paper) -> Self {
        let root = NodeId(0);
        Self {
            nodes: vec![Some(GraphNode::new(root, paper, 0, None))],
            root,
        }
    }

    /// Seed a tree from a citation-network response: the root plus its
    /// three best directly connected nodes.
    ///
    /// A neighbour only qualifies with its own paper payload; there is no
    /// fallback to root or sibling data.
    pub fn from_network(network: &CitationNetwork) -> Result<Self> {
        let root_node = network.root().ok_or_else(|| AppError::Validation {
            message: "Citation network has no root node".to_string(),
            field: Some("citationNetwork.nodes".to_string()),
        })?;

        let root_paper = root_paper(network, root_node)?;
        let root_id = root_paper.id.clone();
        let mut graph = Self::with_root(root_paper);
        if let Some(label) = root_node.label.as_ref().filter(|l| !l.trim().is_empty()) {
            graph.node_mut(graph.root)?.label = label.clone();
        }

        let candidates: Vec<NetworkNode> = neighbours(network, root_node)
            .into_iter()
            .filter(|node| {
                if node.paper.is_none() {
                    debug!(node_id = %node.raw_id, "Dropping neighbour without its own paper data");
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        let exclude: HashSet<PaperId> = [root_id].into_iter().collect();
        let selected = TopKSelector::select_top(candidates, MAX_CHILDREN, &exclude);

        let papers: Vec<Paper> = selected
            .into_iter()
            .filter_map(|node| {
                let score = node.rank_score();
                node.paper.map(|mut paper| {
                    paper.score = Some(score);
                    paper
                })
            })
            .collect();

        let root = graph.root;
        graph.expand(root, papers)?;
        Ok(graph)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Result<&GraphNode> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| AppError::NodeNotFound { id: id.to_string() })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut GraphNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| AppError::NodeNotFound { id: id.to_string() })
    }

    /// Live nodes in arena order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Real (non-placeholder) children of a node
    pub fn children(&self, id: NodeId) -> Result<Vec<&GraphNode>> {
        let node = self.node(id)?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| self.node(*child).ok())
            .filter(|child| !child.placeholder)
            .collect())
    }

    /// Nodes currently showing the given paper
    pub fn find_by_paper(&self, paper_id: &PaperId) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.paper_id.as_ref() == Some(paper_id))
            .map(|n| n.id)
            .collect()
    }

    /// The node's own paper, refusing anything that belongs to another paper
    pub fn paper(&self, id: NodeId) -> Result<&Paper> {
        let node = self.node(id)?;
        let unavailable = || AppError::PaperDataUnavailable { node_id: id.to_string() };

        let expected = node.paper_id.as_ref().ok_or_else(unavailable)?;
        let paper = node.paper.as_ref().ok_or_else(unavailable)?;

        if !paper.matches(expected) {
            return Err(AppError::DataIntegrity {
                expected: expected.to_string(),
                actual: paper.id.to_string(),
            });
        }
        Ok(paper)
    }

    /// Append up to `3 - current` new children, skipping the node's own
    /// paper and papers already present. Repeating the same input is a no-op.
    pub fn expand(&mut self, id: NodeId, candidates: Vec<Paper>) -> Result<ExpandOutcome> {
        let (own_id, depth, mut present) = {
            let node = self.node(id)?;
            if node.placeholder {
                return Err(AppError::PaperDataUnavailable { node_id: id.to_string() });
            }
            let present: HashSet<PaperId> = self
                .children(id)?
                .iter()
                .filter_map(|c| c.paper_id.clone())
                .collect();
            (node.paper_id.clone(), node.depth, present)
        };

        let mut outcome = ExpandOutcome::default();
        for paper in candidates {
            if own_id.as_ref() == Some(&paper.id) || present.contains(&paper.id) {
                outcome.skipped_duplicates += 1;
                continue;
            }
            if present.len() >= MAX_CHILDREN {
                outcome.skipped_over_cap += 1;
                continue;
            }

            present.insert(paper.id.clone());
            let child_id = NodeId(self.nodes.len());
            self.nodes.push(Some(GraphNode::new(child_id, paper, depth + 1, Some(id))));
            self.node_mut(id)?.children.push(child_id);
            outcome.added.push(child_id);
        }

        let node = self.node_mut(id)?;
        node.expandable = present.len() < MAX_CHILDREN;
        if !outcome.added.is_empty() {
            node.collapsed = false;
        }

        debug!(
            node_id = %id,
            added = outcome.added.len(),
            duplicates = outcome.skipped_duplicates,
            over_cap = outcome.skipped_over_cap,
            "Node expanded"
        );
        Ok(outcome)
    }

    /// Hide a node's children without discarding them
    pub fn collapse(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.collapsed = true;
        Ok(())
    }

    /// Show previously collapsed children again
    pub fn restore(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.collapsed = false;
        Ok(())
    }

    /// Add a speculative child shown while an expansion is pending
    pub fn add_placeholder(&mut self, parent: NodeId, label: &str) -> Result<NodeId> {
        let depth = self.node(parent)?.depth;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(GraphNode {
            id,
            paper_id: None,
            label: label.to_string(),
            depth: depth + 1,
            parent: Some(parent),
            children: Vec::new(),
            expandable: false,
            collapsed: false,
            placeholder: true,
            hydrated: false,
            annotations: Annotations::default(),
            paper: None,
        }));

        let node = self.node_mut(parent)?;
        node.children.push(id);
        node.collapsed = false;
        Ok(id)
    }

    /// Drop every placeholder under `parent`, returning how many were removed
    pub fn remove_placeholders(&mut self, parent: NodeId) -> Result<usize> {
        let placeholders: Vec<NodeId> = self
            .node(parent)?
            .children
            .iter()
            .copied()
            .filter(|c| self.node(*c).map(|n| n.placeholder).unwrap_or(false))
            .collect();

        for id in &placeholders {
            self.nodes[id.0] = None;
        }
        self.node_mut(parent)?
            .children
            .retain(|c| !placeholders.contains(c));
        Ok(placeholders.len())
    }

    pub fn set_annotations(&mut self, id: NodeId, annotations: Annotations) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.placeholder {
            return Err(AppError::PaperDataUnavailable { node_id: id.to_string() });
        }
        node.annotations = annotations;
        Ok(())
    }

    /// Merge stored children into one node, under the usual dedup and cap rules
    pub fn apply_stored(&mut self, id: NodeId, stored: &[ChildPaper]) -> Result<ExpandOutcome> {
        let papers = stored.iter().map(ChildPaper::to_paper).collect();
        let outcome = self.expand(id, papers)?;
        self.node_mut(id)?.hydrated = true;
        Ok(outcome)
    }

    /// Nodes that have a paper and have not been hydrated yet
    pub fn hydration_targets(&self) -> Vec<(NodeId, PaperId)> {
        self.nodes()
            .filter(|n| !n.placeholder && !n.hydrated)
            .filter_map(|n| n.paper_id.clone().map(|p| (n.id, p)))
            .collect()
    }

    /// Merge stored children into every node present now. Children added
    /// here are not hydrated themselves; they wait for their own turn.
    pub async fn hydrate(&mut self, store: &dyn RelationshipStore, chat_id: &str) -> Result<usize> {
        let targets = self.hydration_targets();
        let paper_ids: Vec<PaperId> = targets.iter().map(|(_, p)| p.clone()).collect();
        let entries = store.get_many(chat_id, &paper_ids).await?;

        let mut added = 0;
        for (node_id, paper_id) in targets {
            match entries.get(&paper_id) {
                Some(stored) => added += self.apply_stored(node_id, stored)?.added.len(),
                None => self.node_mut(node_id)?.hydrated = true,
            }
        }

        debug!(chat_id, added, "Graph hydrated from relationship store");
        Ok(added)
    }

    /// Visible nodes in depth-first order; collapsed subtrees are excluded
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        let mut visible = Vec::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let Ok(node) = self.node(id) else {
                continue;
            };
            visible.push(id);
            if !node.collapsed {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        visible
    }

    /// Parent/child pairs among visible nodes
    pub fn visible_edges(&self) -> Vec<(NodeId, NodeId)> {
        self.visible_nodes()
            .into_iter()
            .filter_map(|id| self.node(id).ok())
            .filter_map(|node| node.parent.map(|parent| (parent, node.id)))
            .collect()
    }

    /// Check the structural invariants, returning the first violation
    pub fn check_invariants(&self) -> Result<()> {
        for node in self.nodes() {
            let children = self.children(node.id)?;
            if children.len() > MAX_CHILDREN {
                return Err(violation(format!("node {} has {} children", node.id, children.len())));
            }

            let mut seen = HashSet::new();
            for child in children {
                let Some(child_paper) = &child.paper_id else { continue };
                if node.paper_id.as_ref() == Some(child_paper) {
                    return Err(violation(format!("node {} is its own child", node.id)));
                }
                if !seen.insert(child_paper.clone()) {
                    return Err(violation(format!("node {} has duplicate child {}", node.id, child_paper)));
                }
            }

            if node.paper.is_some() {
                self.paper(node.id)?;
            }
        }
        Ok(())
    }
}

fn violation(message: String) -> AppError {
    AppError::Internal { message }
}

/// The seed response's top-level paper when it is the root's, else the root node's own data
fn root_paper(network: &CitationNetwork, root: &NetworkNode) -> Result<Paper> {
    let matches_root = |paper: &&Paper| match &root.paper_id {
        Some(id) => paper.matches(id),
        None => true,
    };

    if let Some(paper) = network.root_paper.as_ref().filter(matches_root) {
        return Ok(paper.clone());
    }
    if let Some(paper) = root.paper.as_ref() {
        return Ok(paper.clone());
    }
    if let Some(paper) = network.root_paper.as_ref() {
        warn!(
            node_id = %root.raw_id,
            payload_paper_id = %paper.id,
            "Seed paper does not match the root node"
        );
    }

    let id = root.paper_id.clone().ok_or_else(|| AppError::Validation {
        message: format!("Root node '{}' has no usable paper identifier", root.raw_id),
        field: Some("citationNetwork.nodes".to_string()),
    })?;
    let label = root.label.clone().unwrap_or_default();
    Ok(Paper::minimal(id, label))
}

/// Nodes sharing an edge with the root, in order of first appearance
fn neighbours<'a>(network: &'a CitationNetwork, root: &NetworkNode) -> Vec<&'a NetworkNode> {
    let mut seen = HashSet::new();
    network
        .edges
        .iter()
        .filter_map(|edge| {
            if edge.source == root.raw_id {
                Some(edge.target.as_str())
            } else if edge.target == root.raw_id {
                Some(edge.source.as_str())
            } else {
                None
            }
        })
        .filter(|raw| *raw != root.raw_id && seen.insert(raw.to_string()))
        .filter_map(|raw| network.nodes.iter().find(|n| n.raw_id == raw))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeweave_common::models::CitationNetworkPayload;
    use citeweave_common::store::InMemoryRelationshipStore;
    use serde_json::json;

    fn pid(s: &str) -> PaperId {
        PaperId::normalize(s).unwrap()
    }

    fn paper(id: &str) -> Paper {
        Paper::minimal(pid(id), format!("Paper {}", id))
    }

    fn child_ids(graph: &GraphModel, id: NodeId) -> Vec<String> {
        graph
            .children(id)
            .unwrap()
            .iter()
            .map(|c| c.paper_id.as_ref().unwrap().to_string())
            .collect()
    }

    fn network(scores: &[f64]) -> CitationNetwork {
        let mut nodes = vec![json!({"id": "root-P0", "isRoot": true, "data": {"paperId": "P0", "title": "Root"}})];
        let mut edges = Vec::new();
        for (i, score) in scores.iter().enumerate() {
            let id = format!("C{}", i + 1);
            nodes.push(json!({
                "id": format!("paper-{}", id),
                "score": score,
                "data": {"paperId": id, "title": format!("Child {}", i + 1)}
            }));
            edges.push(json!({"source": "root-P0", "target": format!("paper-{}", id)}));
        }
        let payload: CitationNetworkPayload = serde_json::from_value(json!({
            "paper": {"paperId": "P0", "title": "Root"},
            "citationNetwork": {"nodes": nodes, "edges": edges}
        }))
        .unwrap();
        CitationNetwork::parse(payload)
    }

    #[test]
    fn test_seed_keeps_three_best_with_stable_ties() {
        let graph = GraphModel::from_network(&network(&[0.9, 0.8, 0.8, 0.5, 0.1])).unwrap();
        assert_eq!(child_ids(&graph, graph.root()), vec!["C1", "C2", "C3"]);
        graph.check_invariants().unwrap();

        // Children start unexpanded
        for child in graph.children(graph.root()).unwrap() {
            assert!(child.children.is_empty());
            assert_eq!(child.depth, 1);
        }
    }

    #[test]
    fn test_seed_drops_neighbours_without_own_data() {
        let payload: CitationNetworkPayload = serde_json::from_value(json!({
            "paper": {"paperId": "P0", "title": "Root"},
            "citationNetwork": {
                "nodes": [
                    {"id": "root-P0", "isRoot": true},
                    {"id": "paper-A", "score": 0.9},
                    {"id": "paper-B", "score": 0.8, "data": {"paperId": "P0", "title": "Root again"}},
                    {"id": "paper-C", "score": 0.2, "data": {"paperId": "C", "title": "C"}}
                ],
                "edges": [
                    {"source": "root-P0", "target": "paper-A"},
                    {"source": "paper-B", "target": "root-P0"},
                    {"source": "root-P0", "target": "paper-C"},
                    {"source": "root-P0", "target": "paper-C"}
                ]
            }
        }))
        .unwrap();

        let graph = GraphModel::from_network(&CitationNetwork::parse(payload)).unwrap();
        assert_eq!(child_ids(&graph, graph.root()), vec!["C"]);
        assert_eq!(graph.node(graph.root()).unwrap().label, "Root");
    }

    #[test]
    fn test_seed_without_root_rejected() {
        let payload: CitationNetworkPayload = serde_json::from_value(json!({
            "citationNetwork": {"nodes": [{"id": "A"}], "edges": []}
        }))
        .unwrap();
        assert!(GraphModel::from_network(&CitationNetwork::parse(payload)).is_err());
    }

    #[test]
    fn test_expand_caps_and_dedups() {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();

        let first = graph.expand(root, vec![paper("A"), paper("P0"), paper("A")]).unwrap();
        assert_eq!(first.added.len(), 1);
        assert_eq!(first.skipped_duplicates, 2);

        let second = graph.expand(root, vec![paper("B"), paper("C"), paper("D")]).unwrap();
        assert_eq!(second.added.len(), 2);
        assert_eq!(second.skipped_over_cap, 1);
        assert_eq!(child_ids(&graph, root), vec!["A", "B", "C"]);
        assert!(!graph.node(root).unwrap().expandable);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn test_expand_is_idempotent() {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();
        graph.expand(root, vec![paper("A"), paper("B")]).unwrap();
        let before = graph.len();

        let again = graph.expand(root, vec![paper("A"), paper("B")]).unwrap();
        assert!(again.added.is_empty());
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_collapse_and_restore_keep_children() {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();
        let added = graph.expand(root, vec![paper("A"), paper("B")]).unwrap().added;
        graph.expand(added[0], vec![paper("A1")]).unwrap();
        assert_eq!(graph.visible_nodes().len(), 4);

        graph.collapse(added[0]).unwrap();
        assert_eq!(graph.visible_nodes().len(), 3);

        graph.collapse(root).unwrap();
        assert_eq!(graph.visible_nodes(), vec![root]);
        assert_eq!(graph.len(), 4);

        graph.restore(root).unwrap();
        graph.restore(added[0]).unwrap();
        assert_eq!(graph.visible_nodes().len(), 4);
        assert_eq!(graph.visible_edges().len(), 3);
    }

    #[test]
    fn test_placeholders_roll_back() {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();
        graph.expand(root, vec![paper("A")]).unwrap();

        let placeholder = graph.add_placeholder(root, "Searching...").unwrap();
        assert_eq!(graph.node(root).unwrap().children.len(), 2);
        assert_eq!(graph.children(root).unwrap().len(), 1);
        assert!(graph.paper(placeholder).is_err());

        assert_eq!(graph.remove_placeholders(root).unwrap(), 1);
        assert!(graph.node(placeholder).is_err());
        assert_eq!(child_ids(&graph, root), vec!["A"]);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn test_paper_integrity() {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();
        assert_eq!(graph.paper(root).unwrap().id.as_str(), "P0");

        // Corrupt the node to point at another paper
        graph.node_mut(root).unwrap().paper_id = Some(pid("OTHER"));
        assert!(matches!(graph.paper(root), Err(AppError::DataIntegrity { .. })));

        graph.node_mut(root).unwrap().paper = None;
        assert!(matches!(graph.paper(root), Err(AppError::PaperDataUnavailable { .. })));
        assert!(matches!(graph.paper(NodeId(99)), Err(AppError::NodeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_hydrate_one_level_only() {
        let store = InMemoryRelationshipStore::new();
        let child = |id: &str, parent: &str| ChildPaper::from_paper(&pid(parent), paper(id));
        store.merge("chat", &pid("P0"), vec![child("A", "P0"), child("B", "P0")]).await.unwrap();
        store.merge("chat", &pid("A"), vec![child("A1", "A")]).await.unwrap();

        let mut graph = GraphModel::with_root(paper("root-P0"));
        let added = graph.hydrate(&store, "chat").await.unwrap();
        assert_eq!(added, 2);
        assert_eq!(child_ids(&graph, graph.root()), vec!["A", "B"]);

        // A's stored children wait for A's own hydration
        let a = graph.find_by_paper(&pid("A"))[0];
        assert!(graph.children(a).unwrap().is_empty());
        assert_eq!(graph.hydration_targets().len(), 2);

        graph.hydrate(&store, "chat").await.unwrap();
        assert_eq!(child_ids(&graph, a), vec!["A1"]);
        graph.check_invariants().unwrap();
    }
}

//! End-to-end expansion tests against the scripted search backend and the
//! in-memory relationship store.

use async_trait::async_trait;
use citeweave_common::config::{LayoutSettings, PollingConfig};
use citeweave_common::errors::{AppError, ErrorCode, Result};
use citeweave_common::ids::PaperId;
use citeweave_common::models::{ChildPaper, Paper};
use citeweave_common::store::{InMemoryRelationshipStore, RelationshipStore};
use citeweave_explorer::{
    ConversationView, ExpandParams, ExpansionController, ExpansionEvent, ExpansionStatus, NodeState,
};
use citeweave_graph::{GraphModel, LayoutEngine, NodeId};
use citeweave_search::{JobClient, ScriptedSearchBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CHAT: &str = "chat-1";

fn pid(id: &str) -> PaperId {
    PaperId::normalize(id).unwrap()
}

fn paper(id: &str, score: f64) -> Paper {
    let mut paper = Paper::minimal(pid(id), format!("Paper {}", id));
    paper.score = Some(score);
    paper
}

fn child(parent: &str, id: &str) -> ChildPaper {
    ChildPaper::from_paper(&pid(parent), paper(id, 0.5))
}

fn keyword_params() -> ExpandParams {
    ExpandParams {
        phrases: vec!["graph neural networks".to_string()],
        ..Default::default()
    }
}

struct Harness {
    backend: Arc<ScriptedSearchBackend>,
    controller: ExpansionController,
    events: mpsc::Receiver<ExpansionEvent>,
    view: Arc<ConversationView>,
    /// Node showing paper P1, a child of the root P0
    node: NodeId,
}

fn harness(backend: ScriptedSearchBackend, store: Arc<dyn RelationshipStore>) -> Harness {
    let backend = Arc::new(backend);
    let jobs = Arc::new(JobClient::new(backend.clone(), &PollingConfig::default(), false));
    let (controller, events) = ExpansionController::new(jobs, store, Duration::from_secs(90), 16);

    let mut graph = GraphModel::with_root(paper("P0", 1.0));
    let root = graph.root();
    let node = graph.expand(root, vec![paper("P1", 0.9)]).unwrap().added[0];
    let view = Arc::new(ConversationView::new(
        CHAT,
        graph,
        LayoutEngine::new(LayoutSettings::default()),
    ));

    Harness {
        backend,
        controller,
        events,
        view,
        node,
    }
}

async fn child_ids(view: &ConversationView, node: NodeId) -> Vec<String> {
    let state = view.read().await;
    state
        .graph
        .children(node)
        .unwrap()
        .iter()
        .map(|c| c.paper_id.as_ref().unwrap().to_string())
        .collect()
}

async fn stored_ids(store: &dyn RelationshipStore, parent: &str) -> Vec<String> {
    store
        .get(CHAT, &pid(parent))
        .await
        .unwrap()
        .iter()
        .map(|c| c.id.to_string())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_merge_with_existing_entry() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    store
        .merge(CHAT, &pid("P1"), vec![child("P1", "C1"), child("P1", "C2")])
        .await
        .unwrap();

    let results = vec![paper("C2", 0.9), paper("C3", 0.8), paper("C4", 0.7)];
    let h = harness(ScriptedSearchBackend::succeeding_after("sim-", 0, results), store.clone());

    let outcome = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap();

    assert_eq!(outcome.status, ExpansionStatus::Applied);
    assert!(outcome.persisted);
    assert_eq!(outcome.job_id.as_deref(), Some("sim-1"));
    assert_eq!(stored_ids(store.as_ref(), "P1").await, vec!["C1", "C2", "C3"]);
    assert_eq!(child_ids(&h.view, h.node).await, vec!["C1", "C2", "C3"]);
    assert_eq!(h.controller.node_state(CHAT, &pid("P1")), NodeState::Idle);

    let state = h.view.read().await;
    state.graph.check_invariants().unwrap();
    assert_eq!(state.layout.nodes.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_full_store_entry_restores_without_search() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    store
        .merge(
            CHAT,
            &pid("paper-P1"),
            vec![child("P1", "C1"), child("P1", "C2"), child("P1", "C3")],
        )
        .await
        .unwrap();

    let h = harness(ScriptedSearchBackend::never_finishing("sim-"), store);
    let outcome = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap();

    assert_eq!(outcome.status, ExpansionStatus::RestoredFromStore);
    assert_eq!(outcome.added.len(), 3);
    assert!(h.backend.created_jobs().is_empty());
    assert_eq!(child_ids(&h.view, h.node).await, vec!["C1", "C2", "C3"]);

    // Nothing left to fetch
    let again = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap();
    assert_eq!(again.status, ExpansionStatus::AlreadyFull);
    assert!(h.backend.created_jobs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_rolls_back() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let mut h = harness(ScriptedSearchBackend::failing("sim-", "invalid filters"), store.clone());

    let err = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::JobFailed { .. }));

    let state = h.view.read().await;
    assert!(state.graph.node(h.node).unwrap().children.is_empty());
    assert_eq!(state.layout.nodes.len(), 2);
    drop(state);

    assert!(stored_ids(store.as_ref(), "P1").await.is_empty());
    assert_eq!(h.controller.node_state(CHAT, &pid("P1")), NodeState::Idle);

    match h.events.recv().await.unwrap() {
        ExpansionEvent::Failed { code, node_id, .. } => {
            assert_eq!(code, ErrorCode::JobFailed);
            assert_eq!(node_id, h.node);
        }
        other => panic!("expected failure event, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_rolls_back() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let h = harness(ScriptedSearchBackend::never_finishing("sim-"), store.clone());

    let err = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::SearchTimeout { attempts: 2, .. }));
    assert_eq!(h.backend.total_polls(), 2);
    assert!(h.view.read().await.graph.node(h.node).unwrap().children.is_empty());
    assert!(stored_ids(store.as_ref(), "P1").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unsatisfiable_request_never_creates_job() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let h = harness(ScriptedSearchBackend::never_finishing("sim-"), store);

    // Minimal anchor: no TLDR or abstract to derive a query from
    let err = h
        .controller
        .request_expand(&h.view, h.node, &ExpandParams::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation { .. }));
    assert!(h.backend.created_jobs().is_empty());
    assert!(h.view.read().await.graph.node(h.node).unwrap().children.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_same_node_rejected_while_expanding() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let h = harness(ScriptedSearchBackend::never_finishing("sim-"), store);

    let ticket = h
        .controller
        .spawn_expand(h.view.clone(), h.node, keyword_params())
        .await
        .unwrap();
    assert!(matches!(
        h.controller.node_state(CHAT, &pid("P1")),
        NodeState::Expanding { .. }
    ));

    let err = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExpansionInProgress { .. }));

    // A different node is independent
    let root = h.view.read().await.graph.root();
    let other = h
        .controller
        .spawn_expand(h.view.clone(), root, keyword_params())
        .await
        .unwrap();

    assert!(matches!(ticket.wait().await, Err(AppError::SearchTimeout { .. })));
    assert!(matches!(other.wait().await, Err(AppError::SearchTimeout { .. })));
    assert_eq!(h.controller.node_state(CHAT, &pid("P1")), NodeState::Idle);
    assert_eq!(h.backend.created_jobs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_placeholders_shown_while_pending() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let results = vec![paper("C1", 0.9), paper("C2", 0.8)];
    let h = harness(ScriptedSearchBackend::succeeding_after("sim-", 1, results), store);

    let ticket = h
        .controller
        .spawn_expand(h.view.clone(), h.node, keyword_params())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    {
        let state = h.view.read().await;
        let node = state.graph.node(h.node).unwrap();
        assert_eq!(node.children.len(), 3);
        assert!(state.graph.children(h.node).unwrap().is_empty());
        assert_eq!(state.layout.nodes.len(), 5);
    }

    let outcome = ticket.wait().await.unwrap();
    assert_eq!(outcome.added.len(), 2);
    assert_eq!(child_ids(&h.view, h.node).await, vec!["C1", "C2"]);
    assert_eq!(h.view.read().await.graph.node(h.node).unwrap().children.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_ticket_still_applies() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let results = vec![paper("C1", 0.4), paper("C2", 0.9)];
    let mut h = harness(ScriptedSearchBackend::succeeding_after("sim-", 1, results), store.clone());

    let ticket = h
        .controller
        .spawn_expand(h.view.clone(), h.node, keyword_params())
        .await
        .unwrap();
    drop(ticket);

    match h.events.recv().await.unwrap() {
        ExpansionEvent::Completed(outcome) => {
            assert_eq!(outcome.node_id, h.node);
            assert_eq!(outcome.status, ExpansionStatus::Applied);
        }
        other => panic!("expected completion event, got {other:?}"),
    }

    assert_eq!(child_ids(&h.view, h.node).await, vec!["C2", "C1"]);
    assert_eq!(stored_ids(store.as_ref(), "P1").await, vec!["C2", "C1"]);
}

#[tokio::test(start_paused = true)]
async fn test_seed_children_persisted_with_new_results() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let results = vec![paper("X", 0.9), paper("Y", 0.8), paper("Z", 0.7)];
    let h = harness(ScriptedSearchBackend::succeeding_after("sim-", 0, results), store.clone());

    // P1 starts with two children the store has never seen
    {
        let mut state = h.view.write().await;
        state
            .graph
            .expand(h.node, vec![paper("S1", 0.5), paper("S2", 0.4)])
            .unwrap();
    }

    let outcome = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap();

    let graph_children = child_ids(&h.view, h.node).await;
    assert_eq!(graph_children, vec!["S1", "S2", "X"]);
    assert_eq!(stored_ids(store.as_ref(), "P1").await, graph_children);

    let reported: Vec<String> = outcome.children.iter().map(|c| c.id.to_string()).collect();
    assert_eq!(reported, graph_children);
}

#[tokio::test(start_paused = true)]
async fn test_reopened_view_receives_detached_result() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let results = vec![paper("C1", 0.9), paper("C2", 0.8)];
    let h = harness(ScriptedSearchBackend::succeeding_after("sim-", 1, results), store.clone());
    let registry = h.controller.views().clone();
    registry.insert_shared(h.view.clone()).await;

    let ticket = h
        .controller
        .spawn_expand(h.view.clone(), h.node, keyword_params())
        .await
        .unwrap();

    // Reopen: the same arena index now shows a different paper
    let mut graph = GraphModel::with_root(paper("P0", 1.0));
    let root = graph.root();
    let added = graph.expand(root, vec![paper("P9", 0.9), paper("P1", 0.8)]).unwrap().added;
    assert_eq!(added[0], h.node);
    let live = registry
        .insert(ConversationView::new(CHAT, graph, LayoutEngine::new(LayoutSettings::default())))
        .await;

    // P9 is not locked by the in-flight expansion of P1
    let other = h
        .controller
        .request_expand(&live, added[0], &keyword_params())
        .await
        .unwrap();
    assert_eq!(other.status, ExpansionStatus::Applied);

    let outcome = ticket.wait().await.unwrap();
    assert_eq!(outcome.node_id, added[1]);
    assert_eq!(child_ids(&live, added[1]).await, vec!["C1", "C2"]);
    assert_eq!(stored_ids(store.as_ref(), "P1").await, vec!["C1", "C2"]);

    // The replaced view is left without placeholders
    let old = h.view.read().await;
    assert!(old.graph.node(h.node).unwrap().children.is_empty());
}

/// Store whose writes always fail
struct ReadOnlyStore;

#[async_trait]
impl RelationshipStore for ReadOnlyStore {
    async fn get(&self, _chat_id: &str, _parent: &PaperId) -> Result<Vec<ChildPaper>> {
        Ok(Vec::new())
    }

    async fn merge(&self, _chat_id: &str, parent: &PaperId, _children: Vec<ChildPaper>) -> Result<Vec<ChildPaper>> {
        Err(AppError::Storage {
            message: format!("write rejected for {}", parent),
        })
    }

    async fn delete_conversation(&self, _chat_id: &str) -> Result<usize> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "read-only"
    }
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_keeps_graph_and_warns() {
    let results = vec![paper("C1", 0.9), paper("C2", 0.8), paper("C3", 0.7), paper("C4", 0.6)];
    let h = harness(
        ScriptedSearchBackend::succeeding_after("sim-", 0, results),
        Arc::new(ReadOnlyStore),
    );

    let outcome = h
        .controller
        .request_expand(&h.view, h.node, &keyword_params())
        .await
        .unwrap();

    assert!(!outcome.persisted);
    assert!(outcome.warning.unwrap().contains("storage issue"));
    assert_eq!(child_ids(&h.view, h.node).await, vec!["C1", "C2", "C3"]);
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_node_cannot_expand() {
    let store = Arc::new(InMemoryRelationshipStore::new());
    let h = harness(ScriptedSearchBackend::never_finishing("sim-"), store);

    let placeholder = {
        let mut state = h.view.write().await;
        state.graph.add_placeholder(h.node, "pending").unwrap()
    };

    let err = h
        .controller
        .request_expand(&h.view, placeholder, &keyword_params())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaperDataUnavailable { .. }));
    assert!(h.backend.created_jobs().is_empty());
}

//! Conversation views
//!
//! One view per conversation: the graph, its latest layout and the engine
//! that produces it. Views never share graph state; the relationship store
//! is the only thing two views of the same conversation have in common.

use citeweave_common::errors::{AppError, Result};
use citeweave_common::models::CitationNetwork;
use citeweave_common::store::RelationshipStore;
use citeweave_graph::{Annotations, GraphModel, GraphNode, Layout, LayoutEngine, NodeId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Graph plus the layout computed from it
pub struct ViewState {
    pub graph: GraphModel,
    pub layout: Layout,
}

/// Serializable copy of a view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub chat_id: String,
    pub root: NodeId,
    pub nodes: Vec<GraphNode>,
    pub layout: Layout,
}

pub struct ConversationView {
    chat_id: String,
    engine: LayoutEngine,
    state: RwLock<ViewState>,
}

impl ConversationView {
    pub fn new(chat_id: impl Into<String>, graph: GraphModel, engine: LayoutEngine) -> Self {
        let layout = engine.layout(&graph);
        Self {
            chat_id: chat_id.into(),
            engine,
            state: RwLock::new(ViewState { graph, layout }),
        }
    }

    /// Seed from a citation network and restore stored expansions, one level deep
    pub async fn open(
        chat_id: impl Into<String>,
        network: &CitationNetwork,
        store: &dyn RelationshipStore,
        engine: LayoutEngine,
    ) -> Result<Self> {
        let chat_id = chat_id.into();
        let mut graph = GraphModel::from_network(network)?;

        // An unreadable store leaves nodes unhydrated; expanding them retries the lookup
        let restored = match graph.hydrate(store, &chat_id).await {
            Ok(restored) => restored,
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Relationship store unavailable, opening without stored children");
                0
            }
        };

        info!(
            chat_id = %chat_id,
            nodes = graph.len(),
            restored,
            "Conversation view opened"
        );
        Ok(Self::new(chat_id, graph, engine))
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ViewState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ViewState> {
        self.state.write().await
    }

    /// Recompute the layout, keeping untouched nodes in place
    pub fn relayout(&self, state: &mut ViewState) {
        state.layout = self.engine.relayout(&state.graph, &state.layout);
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let state = self.read().await;
        ViewSnapshot {
            chat_id: self.chat_id.clone(),
            root: state.graph.root(),
            nodes: state.graph.nodes().cloned().collect(),
            layout: state.layout.clone(),
        }
    }

    pub async fn collapse(&self, node: NodeId) -> Result<Layout> {
        self.mutate(|graph| graph.collapse(node)).await
    }

    pub async fn restore(&self, node: NodeId) -> Result<Layout> {
        self.mutate(|graph| graph.restore(node)).await
    }

    pub async fn set_annotations(&self, node: NodeId, annotations: Annotations) -> Result<Layout> {
        self.mutate(|graph| graph.set_annotations(node, annotations)).await
    }

    async fn mutate<F>(&self, change: F) -> Result<Layout>
    where
        F: FnOnce(&mut GraphModel) -> Result<()>,
    {
        let mut state = self.write().await;
        change(&mut state.graph)?;
        self.relayout(&mut state);
        Ok(state.layout.clone())
    }
}

/// Open views keyed by conversation
#[derive(Default)]
pub struct ConversationRegistry {
    views: RwLock<HashMap<String, Arc<ConversationView>>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a view, replacing any previous one for the same conversation
    pub async fn insert(&self, view: ConversationView) -> Arc<ConversationView> {
        self.insert_shared(Arc::new(view)).await
    }

    pub async fn insert_shared(&self, view: Arc<ConversationView>) -> Arc<ConversationView> {
        self.views
            .write()
            .await
            .insert(view.chat_id().to_string(), view.clone());
        view
    }

    pub async fn get(&self, chat_id: &str) -> Result<Arc<ConversationView>> {
        self.views
            .read()
            .await
            .get(chat_id)
            .cloned()
            .ok_or_else(|| AppError::ConversationNotFound {
                id: chat_id.to_string(),
            })
    }

    pub async fn remove(&self, chat_id: &str) -> Option<Arc<ConversationView>> {
        self.views.write().await.remove(chat_id)
    }

    pub async fn len(&self) -> usize {
        self.views.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeweave_common::config::LayoutSettings;
    use citeweave_common::ids::PaperId;
    use citeweave_common::models::{ChildPaper, Paper};
    use citeweave_common::store::InMemoryRelationshipStore;

    /// Store that cannot be reached at all
    struct UnreachableStore;

    #[async_trait::async_trait]
    impl RelationshipStore for UnreachableStore {
        async fn get(&self, _chat_id: &str, _parent: &PaperId) -> Result<Vec<ChildPaper>> {
            Err(AppError::Storage {
                message: "connection refused".to_string(),
            })
        }

        async fn merge(&self, _chat_id: &str, _parent: &PaperId, _children: Vec<ChildPaper>) -> Result<Vec<ChildPaper>> {
            Err(AppError::Storage {
                message: "connection refused".to_string(),
            })
        }

        async fn delete_conversation(&self, _chat_id: &str) -> Result<usize> {
            Ok(0)
        }

        fn backend_name(&self) -> &'static str {
            "unreachable"
        }
    }

    fn root_only_network() -> CitationNetwork {
        CitationNetwork {
            root_paper: Some(paper("P0")),
            nodes: vec![citeweave_common::models::NetworkNode {
                raw_id: "root-P0".into(),
                paper_id: Some(PaperId::normalize("P0").unwrap()),
                is_root: true,
                label: None,
                score: None,
                paper: None,
                node_type: None,
            }],
            edges: vec![],
            stats: None,
        }
    }

    fn paper(id: &str) -> Paper {
        Paper::minimal(PaperId::normalize(id).unwrap(), id)
    }

    #[tokio::test]
    async fn test_collapse_relayouts() {
        let mut graph = GraphModel::with_root(paper("P0"));
        graph.expand(graph.root(), vec![paper("A"), paper("B")]).unwrap();
        let view = ConversationView::new("chat", graph, LayoutEngine::new(LayoutSettings::default()));
        assert_eq!(view.snapshot().await.layout.nodes.len(), 3);

        let root = view.read().await.graph.root();
        let layout = view.collapse(root).await.unwrap();
        assert_eq!(layout.nodes.len(), 1);

        let layout = view.restore(root).await.unwrap();
        assert_eq!(layout.nodes.len(), 3);
        assert!(view.collapse(NodeId(42)).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = ConversationRegistry::new();
        let view = ConversationView::new(
            "chat-1",
            GraphModel::with_root(paper("P0")),
            LayoutEngine::new(LayoutSettings::default()),
        );
        registry.insert(view).await;

        assert!(registry.get("chat-1").await.is_ok());
        assert!(matches!(
            registry.get("chat-2").await,
            Err(AppError::ConversationNotFound { .. })
        ));
        assert!(registry.remove("chat-1").await.is_some());
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_open_restores_stored_children() {
        let store = InMemoryRelationshipStore::new();
        let p0 = PaperId::normalize("P0").unwrap();
        store
            .merge("chat", &p0, vec![ChildPaper::from_paper(&p0, paper("S1"))])
            .await
            .unwrap();

        let network = root_only_network();

        let view = ConversationView::open(
            "chat",
            &network,
            &store,
            LayoutEngine::new(LayoutSettings::default()),
        )
        .await
        .unwrap();

        let snapshot = view.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.layout.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_open_survives_unreadable_store() {
        let view = ConversationView::open(
            "chat",
            &root_only_network(),
            &UnreachableStore,
            LayoutEngine::new(LayoutSettings::default()),
        )
        .await
        .unwrap();

        let snapshot = view.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(!snapshot.nodes[0].hydrated);
    }
}

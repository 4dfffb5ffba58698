//! Expansion controller
//!
//! Drives one node through `Idle -> Expanding -> Applied | FailedRolledBack`:
//! hydrate the node from the store, show placeholders, run a search job,
//! pick the best new children, persist them, then apply the persisted entry
//! to the graph. Every failure removes the placeholders and leaves the
//! store untouched.
//!
//! Every entry written here mirrors the node's full child list, seed
//! children included, so the store never holds children the graph lacks.

use crate::locks::{ExpansionGuard, NodeLocks, NodeState};
use crate::view::{ConversationRegistry, ConversationView};
use chrono::{DateTime, Utc};
use citeweave_common::config::AppConfig;
use citeweave_common::errors::{AppError, ErrorCode, Result};
use citeweave_common::ids::PaperId;
use citeweave_common::metrics;
use citeweave_common::models::{ChildPaper, Paper};
use citeweave_common::store::RelationshipStore;
use citeweave_common::MAX_CHILDREN;
use citeweave_graph::{Layout, NodeId};
use citeweave_search::{JobClient, JobRequest, TopKSelector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What a caller may ask an expansion to search for
pub type ExpandParams = JobRequest;

pub const PLACEHOLDER_LABEL: &str = "Searching...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionStatus {
    /// Search ran and its results were applied
    Applied,
    /// The store already held a full set of children; no job was created
    RestoredFromStore,
    /// The node already had three children
    AlreadyFull,
}

impl ExpansionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpansionStatus::Applied => "applied",
            ExpansionStatus::RestoredFromStore => "restored",
            ExpansionStatus::AlreadyFull => "full",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionOutcome {
    pub expansion_id: Uuid,
    pub chat_id: String,
    pub node_id: NodeId,
    pub status: ExpansionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Nodes added to the graph by this expansion
    pub added: Vec<NodeId>,
    /// Stored children of the node after the expansion
    pub children: Vec<ChildPaper>,
    /// False when the store write failed and only the in-memory graph changed
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
    pub layout: Layout,
}

/// Broadcast for every finished expansion, successful or not
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionEvent {
    Completed(ExpansionOutcome),
    Failed {
        expansion_id: Uuid,
        chat_id: String,
        node_id: NodeId,
        code: ErrorCode,
        message: String,
    },
}

/// Handle to a detached expansion. Dropping it does not cancel the work.
pub struct ExpansionTicket {
    pub expansion_id: Uuid,
    pub node_id: NodeId,
    receiver: oneshot::Receiver<Result<ExpansionOutcome>>,
}

impl ExpansionTicket {
    pub async fn wait(self) -> Result<ExpansionOutcome> {
        self.receiver.await.map_err(|_| AppError::Internal {
            message: format!("expansion {} ended without a result", self.expansion_id),
        })?
    }
}

#[derive(Clone)]
pub struct ExpansionController {
    jobs: Arc<JobClient>,
    store: Arc<dyn RelationshipStore>,
    locks: Arc<NodeLocks>,
    views: Arc<ConversationRegistry>,
    lock_timeout: Duration,
    events: mpsc::Sender<ExpansionEvent>,
}

impl ExpansionController {
    pub fn new(
        jobs: Arc<JobClient>,
        store: Arc<dyn RelationshipStore>,
        lock_timeout: Duration,
        event_capacity: usize,
    ) -> (Self, mpsc::Receiver<ExpansionEvent>) {
        let (events, receiver) = mpsc::channel(event_capacity.max(1));
        let controller = Self {
            jobs,
            store,
            locks: NodeLocks::new(),
            views: Arc::new(ConversationRegistry::new()),
            lock_timeout,
            events,
        };
        (controller, receiver)
    }

    pub fn from_config(
        config: &AppConfig,
        jobs: Arc<JobClient>,
        store: Arc<dyn RelationshipStore>,
    ) -> (Self, mpsc::Receiver<ExpansionEvent>) {
        Self::new(
            jobs,
            store,
            config.expansion_lock_timeout(),
            config.expansion.event_channel_capacity,
        )
    }

    pub fn store(&self) -> &Arc<dyn RelationshipStore> {
        &self.store
    }

    /// Views registered here receive the results of expansions started on
    /// a view that has since been replaced
    pub fn views(&self) -> &Arc<ConversationRegistry> {
        &self.views
    }

    pub fn node_state(&self, chat_id: &str, paper: &PaperId) -> NodeState {
        self.locks.state(chat_id, paper)
    }

    /// Expand a node and wait for the result
    pub async fn request_expand(
        &self,
        view: &ConversationView,
        node: NodeId,
        params: &ExpandParams,
    ) -> Result<ExpansionOutcome> {
        let (guard, anchor) = self.acquire(view, node).await?;
        self.run(view, node, anchor, guard, params).await
    }

    /// Expand a node on a detached task.
    ///
    /// A request for a node that is already expanding is rejected here,
    /// before anything is spawned.
    pub async fn spawn_expand(
        &self,
        view: Arc<ConversationView>,
        node: NodeId,
        params: ExpandParams,
    ) -> Result<ExpansionTicket> {
        let (guard, anchor) = self.acquire(&view, node).await?;
        let expansion_id = guard.expansion_id();
        let (sender, receiver) = oneshot::channel();
        let controller = self.clone();

        tokio::spawn(async move {
            let result = controller.run(&view, node, anchor, guard, &params).await;
            if sender.send(result).is_err() {
                debug!(expansion_id = %expansion_id, "Nobody waiting on detached expansion");
            }
        });

        Ok(ExpansionTicket {
            expansion_id,
            node_id: node,
            receiver,
        })
    }

    /// Lock the node's paper; placeholders and missing papers fail here
    async fn acquire(&self, view: &ConversationView, node: NodeId) -> Result<(ExpansionGuard, Paper)> {
        let anchor = view.read().await.graph.paper(node)?.clone();
        let guard = self
            .locks
            .acquire(view.chat_id(), &anchor.id, self.lock_timeout)
            .inspect_err(|_| {
                metrics::record_expansion(0.0, "rejected");
                info!(chat_id = view.chat_id(), node_id = %node, "Expansion already in progress");
            })?;
        Ok((guard, anchor))
    }

    #[instrument(
        skip(self, view, anchor, guard, params),
        fields(chat_id = %view.chat_id(), node_id = %node, paper_id = %guard.paper(), expansion_id = %guard.expansion_id())
    )]
    async fn run(
        &self,
        view: &ConversationView,
        node: NodeId,
        anchor: Paper,
        guard: ExpansionGuard,
        params: &ExpandParams,
    ) -> Result<ExpansionOutcome> {
        let started = Instant::now();
        let expansion_id = guard.expansion_id();

        let result = self.expand(view, node, &anchor, expansion_id, params, started).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => {
                metrics::record_expansion(elapsed, outcome.status.as_str());
                info!(
                    status = outcome.status.as_str(),
                    added = outcome.added.len(),
                    persisted = outcome.persisted,
                    "Expansion finished"
                );
                self.publish(ExpansionEvent::Completed(outcome.clone()));
            }
            Err(e) => {
                metrics::record_expansion(elapsed, "failed");
                warn!(error = %e, "Expansion failed and was rolled back");
                self.publish(ExpansionEvent::Failed {
                    expansion_id,
                    chat_id: view.chat_id().to_string(),
                    node_id: node,
                    code: e.code(),
                    message: e.user_message(),
                });
            }
        }

        drop(guard);
        result
    }

    async fn expand(
        &self,
        view: &ConversationView,
        node: NodeId,
        anchor: &Paper,
        expansion_id: Uuid,
        params: &ExpandParams,
        started: Instant,
    ) -> Result<ExpansionOutcome> {
        let chat_id = view.chat_id();
        let parent = anchor.id.clone();

        // Restore from the store first; a full node needs no search
        let stored = self.lookup(chat_id, &parent).await;
        {
            let mut state = view.write().await;
            let restored = state.graph.apply_stored(node, &stored)?;
            if !restored.added.is_empty() {
                debug!(restored = restored.added.len(), "Node hydrated before expansion");
            }

            if state.graph.children(node)?.len() >= MAX_CHILDREN {
                let status = if restored.added.is_empty() {
                    ExpansionStatus::AlreadyFull
                } else {
                    ExpansionStatus::RestoredFromStore
                };
                view.relayout(&mut state);
                return Ok(ExpansionOutcome {
                    expansion_id,
                    chat_id: chat_id.to_string(),
                    node_id: node,
                    status,
                    job_id: None,
                    added: restored.added,
                    children: stored,
                    persisted: true,
                    warning: None,
                    duration_ms: elapsed_ms(started),
                    completed_at: Utc::now(),
                    layout: state.layout.clone(),
                });
            }

            let open_slots = MAX_CHILDREN - state.graph.children(node)?.len();
            for _ in 0..open_slots {
                state.graph.add_placeholder(node, PLACEHOLDER_LABEL)?;
            }
            view.relayout(&mut state);
        }

        let searched = self.search(view, node, anchor, params).await;
        let (job_id, selected) = match searched {
            Ok(found) => found,
            Err(e) => {
                let mut state = view.write().await;
                state.graph.remove_placeholders(node)?;
                view.relayout(&mut state);
                return Err(e);
            }
        };

        // A view reopened meanwhile gets the results; placeholders stay with
        // the view they were added to
        let replacement = self.replacement_view(view, &parent).await;
        if replacement.is_some() {
            let mut state = view.write().await;
            state.graph.remove_placeholders(node)?;
            view.relayout(&mut state);
        }
        let (target, target_node) = match &replacement {
            Some((live, live_node)) => (live.as_ref(), *live_node),
            None => (view, node),
        };

        // Store write and graph update happen under the same view lock
        let mut state = target.write().await;
        if replacement.is_none() {
            state.graph.remove_placeholders(node)?;
        }

        let current: Vec<Paper> = state
            .graph
            .children(target_node)?
            .iter()
            .filter_map(|child| state.graph.paper(child.id).ok().cloned())
            .collect();
        let present: HashSet<PaperId> = current.iter().map(|p| p.id.clone()).collect();
        let open_slots = MAX_CHILDREN.saturating_sub(current.len());
        let fresh: Vec<Paper> = selected
            .into_iter()
            .filter(|paper| paper.id != parent && !present.contains(&paper.id))
            .take(open_slots)
            .collect();

        let incoming: Vec<ChildPaper> = current
            .into_iter()
            .chain(fresh)
            .map(|paper| ChildPaper::from_paper(&parent, paper))
            .collect();

        let (children, persisted, warning) = match self.store.merge(chat_id, &parent, incoming.clone()).await {
            Ok(merged) => (merged, true, None),
            Err(e) => {
                warn!(error = %e, "Storage issue, expansion kept in memory only");
                (incoming, false, Some(e.user_message()))
            }
        };

        let papers: Vec<Paper> = children.iter().map(ChildPaper::to_paper).collect();
        let applied = state.graph.expand(target_node, papers)?;
        target.relayout(&mut state);

        Ok(ExpansionOutcome {
            expansion_id,
            chat_id: chat_id.to_string(),
            node_id: target_node,
            status: ExpansionStatus::Applied,
            job_id: Some(job_id),
            added: applied.added,
            children,
            persisted,
            warning,
            duration_ms: elapsed_ms(started),
            completed_at: Utc::now(),
            layout: state.layout.clone(),
        })
    }

    /// The view now registered for the conversation, if it replaced `view`
    /// and still shows the paper
    async fn replacement_view(
        &self,
        view: &ConversationView,
        parent: &PaperId,
    ) -> Option<(Arc<ConversationView>, NodeId)> {
        let live = self.views.get(view.chat_id()).await.ok()?;
        if std::ptr::eq(Arc::as_ptr(&live), view) {
            return None;
        }

        let live_node = live.read().await.graph.find_by_paper(parent).first().copied()?;
        info!(node_id = %live_node, "Conversation view was reopened, applying results to the live view");
        Some((live, live_node))
    }

    /// Run the search job and keep the best candidates the node does not have yet
    async fn search(
        &self,
        view: &ConversationView,
        node: NodeId,
        anchor: &Paper,
        params: &ExpandParams,
    ) -> Result<(String, Vec<Paper>)> {
        let (job_type, body, filters) = params.resolve(Some(anchor))?;
        let job_id = self.jobs.create(job_type, &body, &filters).await?;
        let results = self.jobs.await_completion(&job_id).await?;

        let exclude: HashSet<PaperId> = {
            let state = view.read().await;
            state
                .graph
                .children(node)?
                .iter()
                .filter_map(|child| child.paper_id.clone())
                .chain(std::iter::once(anchor.id.clone()))
                .collect()
        };

        let candidates = results.len();
        let selected = TopKSelector::select_top(results, MAX_CHILDREN, &exclude);
        debug!(job_id = %job_id, candidates, selected = selected.len(), "Search results ranked");
        Ok((job_id, selected))
    }

    /// Stored children, or nothing when the store cannot be read
    async fn lookup(&self, chat_id: &str, parent: &PaperId) -> Vec<ChildPaper> {
        match self.store.get(chat_id, parent).await {
            Ok(children) => children,
            Err(e) => {
                warn!(paper_id = %parent, error = %e, "Relationship lookup failed, expanding without stored children");
                Vec::new()
            }
        }
    }

    fn publish(&self, event: ExpansionEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!(error = %e, "Expansion event not delivered");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

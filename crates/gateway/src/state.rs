//! Shared handler state

use citeweave_common::config::AppConfig;
use citeweave_common::errors::Result;
use citeweave_common::store::RelationshipStore;
use citeweave_explorer::{ConversationRegistry, ExpansionController, ExpansionEvent};
use citeweave_graph::LayoutEngine;
use citeweave_search::{CitationSource, JobClient};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RelationshipStore>,
    pub seeds: Arc<dyn CitationSource>,
    pub controller: ExpansionController,
    pub views: Arc<ConversationRegistry>,
}

impl AppState {
    /// Wire up the controller; the returned receiver carries expansion events
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn RelationshipStore>,
        jobs: Arc<JobClient>,
        seeds: Arc<dyn CitationSource>,
    ) -> (Self, mpsc::Receiver<ExpansionEvent>) {
        let (controller, events) = ExpansionController::from_config(&config, jobs, store.clone());
        // Shared with the controller so reopened views receive in-flight results
        let views = controller.views().clone();
        let state = Self {
            config,
            store,
            seeds,
            controller,
            views,
        };
        (state, events)
    }

    pub fn layout_engine(&self) -> LayoutEngine {
        LayoutEngine::new(self.config.layout.clone())
    }

    pub async fn ping_store(&self) -> Result<()> {
        self.store.ping().await
    }
}

/// Log every finished expansion, including ones nobody is waiting on
pub fn spawn_event_logger(mut events: mpsc::Receiver<ExpansionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ExpansionEvent::Completed(outcome) => info!(
                    chat_id = %outcome.chat_id,
                    node_id = %outcome.node_id,
                    expansion_id = %outcome.expansion_id,
                    status = outcome.status.as_str(),
                    persisted = outcome.persisted,
                    "Expansion completed"
                ),
                ExpansionEvent::Failed {
                    expansion_id,
                    chat_id,
                    node_id,
                    code,
                    message,
                } => warn!(
                    chat_id = %chat_id,
                    node_id = %node_id,
                    expansion_id = %expansion_id,
                    code = ?code,
                    error = %message,
                    "Expansion failed"
                ),
            }
        }
    })
}

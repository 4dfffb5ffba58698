//! Conversation graph handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::state::AppState;
use citeweave_common::{
    errors::{AppError, Result},
    models::{CitationNetwork, CitationNetworkPayload, CitationNetworkRequest},
};
use citeweave_explorer::{ConversationView, ViewSnapshot};

/// Open a view from an inline network or by seeding from the search backend
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OpenGraphRequest {
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub corpus_id: Option<String>,
    #[validate(range(min = 1, max = 3))]
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Citation-network payload already fetched by the caller
    #[serde(default)]
    pub network: Option<CitationNetworkPayload>,
}

fn default_depth() -> u32 { 1 }

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConversationResponse {
    pub chat_id: String,
    pub view_closed: bool,
    pub deleted_entries: usize,
}

/// Open (or reopen) a conversation's graph
pub async fn open_graph(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<OpenGraphRequest>,
) -> Result<(StatusCode, Json<ViewSnapshot>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let network = match request.network {
        Some(payload) => CitationNetwork::parse(payload),
        None => {
            if request.paper_id.is_none() && request.corpus_id.is_none() {
                return Err(AppError::Validation {
                    message: "Provide a citation network, a paperId, or a corpusId".to_string(),
                    field: Some("paperId".to_string()),
                });
            }
            state
                .seeds
                .fetch(&CitationNetworkRequest {
                    corpus_id: request.corpus_id,
                    paper_id: request.paper_id,
                    depth: request.depth,
                    chat_id: chat_id.clone(),
                })
                .await?
        }
    };

    let view = ConversationView::open(
        chat_id,
        &network,
        state.store.as_ref(),
        state.layout_engine(),
    )
    .await?;
    let view = state.views.insert(view).await;

    Ok((StatusCode::CREATED, Json(view.snapshot().await)))
}

/// Current tree and layout
pub async fn get_graph(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<ViewSnapshot>> {
    let view = state.views.get(&chat_id).await?;
    Ok(Json(view.snapshot().await))
}

/// Close the view and drop every stored relationship of the conversation
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<DeleteConversationResponse>> {
    let view_closed = state.views.remove(&chat_id).await.is_some();
    let deleted_entries = state.store.delete_conversation(&chat_id).await?;

    tracing::info!(chat_id = %chat_id, view_closed, deleted_entries, "Conversation deleted");

    Ok(Json(DeleteConversationResponse {
        chat_id,
        view_closed,
        deleted_entries,
    }))
}

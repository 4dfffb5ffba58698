//! Relationship persistence handlers
//!
//! Serves the store directly: reads by `(chatId, paperId)` and merges
//! capped at three children per parent.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::state::AppState;
use citeweave_common::{
    errors::Result,
    models::{
        RelationshipsQuery, RelationshipsResponse, SaveRelationshipsRequest,
        SaveRelationshipsResponse,
    },
};

/// Stored children of a paper in a conversation
pub async fn get_relationships(
    State(state): State<AppState>,
    Query(query): Query<RelationshipsQuery>,
) -> Result<Json<RelationshipsResponse>> {
    let child_papers = state.store.get(&query.chat_id, &query.paper_id).await?;
    Ok(Json(RelationshipsResponse { child_papers }))
}

/// Merge children into a paper's entry
pub async fn save_relationships(
    State(state): State<AppState>,
    Json(request): Json<SaveRelationshipsRequest>,
) -> Result<Json<SaveRelationshipsResponse>> {
    let merged = state
        .store
        .merge(&request.chat_id, &request.paper_id, request.child_papers)
        .await?;

    Ok(Json(SaveRelationshipsResponse {
        total_children: merged.len(),
    }))
}

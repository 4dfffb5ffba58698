//! Node action handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use citeweave_common::errors::Result;
use citeweave_explorer::ExpandParams;
use citeweave_graph::{Annotations, Layout, MetadataField, NodeId};

#[derive(Debug, Default, Deserialize)]
pub struct ExpandQuery {
    /// Run the expansion in the background and return immediately
    #[serde(default)]
    pub detach: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedExpansion {
    pub expansion_id: Uuid,
    pub node_id: NodeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationsRequest {
    #[serde(default)]
    pub keyword_tags: Vec<String>,
    #[serde(default)]
    pub metadata_fields: Vec<MetadataField>,
}

/// Expand a node with up to three new related papers
pub async fn expand(
    State(state): State<AppState>,
    Path((chat_id, node_id)): Path<(String, usize)>,
    Query(query): Query<ExpandQuery>,
    Json(params): Json<ExpandParams>,
) -> Result<Response> {
    let view = state.views.get(&chat_id).await?;
    let node = NodeId(node_id);

    if query.detach {
        // The ticket is dropped; the result still lands in the graph and the event log
        let ticket = state.controller.spawn_expand(view, node, params).await?;
        let body = DetachedExpansion {
            expansion_id: ticket.expansion_id,
            node_id: ticket.node_id,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let outcome = state.controller.request_expand(&view, node, &params).await?;
    Ok(Json(outcome).into_response())
}

/// Hide a node's children
pub async fn collapse(
    State(state): State<AppState>,
    Path((chat_id, node_id)): Path<(String, usize)>,
) -> Result<Json<Layout>> {
    let view = state.views.get(&chat_id).await?;
    Ok(Json(view.collapse(NodeId(node_id)).await?))
}

/// Show a node's children again
pub async fn restore(
    State(state): State<AppState>,
    Path((chat_id, node_id)): Path<(String, usize)>,
) -> Result<Json<Layout>> {
    let view = state.views.get(&chat_id).await?;
    Ok(Json(view.restore(NodeId(node_id)).await?))
}

/// Replace a node's keyword tags and metadata fields
pub async fn set_annotations(
    State(state): State<AppState>,
    Path((chat_id, node_id)): Path<(String, usize)>,
    Json(request): Json<AnnotationsRequest>,
) -> Result<Json<Layout>> {
    let annotations = Annotations::new(request.keyword_tags, request.metadata_fields)?;
    let view = state.views.get(&chat_id).await?;
    Ok(Json(view.set_annotations(NodeId(node_id), annotations).await?))
}

//! CiteWeave API Gateway
//!
//! HTTP surface over conversation graphs:
//! - Open, read and delete conversation graphs
//! - Expand, collapse, restore and annotate nodes
//! - Relationship persistence endpoints
//! - Rate limiting, request ids, tracing and request metrics

pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::{spawn_event_logger, AppState};

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use middleware::rate_limit::{rate_limit_middleware, RateLimit};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Conversation routes
    let api_routes = Router::new()
        .route(
            "/conversations/{chat_id}",
            axum::routing::delete(handlers::graphs::delete_conversation),
        )
        .route(
            "/conversations/{chat_id}/graph",
            post(handlers::graphs::open_graph).get(handlers::graphs::get_graph),
        )
        .route(
            "/conversations/{chat_id}/nodes/{node_id}/expand",
            post(handlers::nodes::expand),
        )
        .route(
            "/conversations/{chat_id}/nodes/{node_id}/collapse",
            post(handlers::nodes::collapse),
        )
        .route(
            "/conversations/{chat_id}/nodes/{node_id}/restore",
            post(handlers::nodes::restore),
        )
        .route(
            "/conversations/{chat_id}/nodes/{node_id}/annotations",
            put(handlers::nodes::set_annotations),
        );

    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Relationship persistence
        .route(
            "/relationships",
            get(handlers::relationships::get_relationships)
                .post(handlers::relationships::save_relationships),
        )
        .nest("/v1", api_routes)
        .layer(from_fn(middleware::metrics::track_metrics));

    if state.config.rate_limit.enabled {
        let limit = RateLimit::new(&state.config.rate_limit);
        router = router.layer(from_fn_with_state(limit, rate_limit_middleware));
    }

    let timeout = state.config.request_timeout();

    // Compose the app
    router
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

use crate::api::{handlers, AppState};
use crate::metrics::MetricsLayer;
use axum::{routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the HTTP router: accept/reject links, item records, module
/// descriptions, health and metrics
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        // Module self-description
        .route("/modules/filters", get(handlers::list_filter_modules))
        .route("/modules/actions", get(handlers::list_action_modules))
        // Items and out-of-band decisions
        .route("/topics/:topic_id/tweets/:item_id", get(handlers::get_item))
        .route(
            "/topics/:topic_id/tweets/:item_id/accept",
            get(handlers::accept_item),
        )
        .route(
            "/topics/:topic_id/tweets/:item_id/reject",
            get(handlers::reject_item),
        )
        .with_state(state)
        .layer(MetricsLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
}

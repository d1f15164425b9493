pub mod handlers;

use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::runtime::TelemetryRuntime;

pub fn router(runtime: Arc<TelemetryRuntime>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/events/recent", get(handlers::recent_events))
        .route("/events/filter-options", get(handlers::filter_options))
        .route("/events/by-agent/:agent", get(handlers::events_by_agent))
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/tasks/:task_id", get(handlers::get_task))
        .route("/api/tasks/:task_id/output", get(handlers::get_task_output))
        .route("/stream", get(handlers::ws_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(runtime)
}

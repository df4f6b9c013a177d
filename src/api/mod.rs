//! REST interface over the scenario manager.
//!
//! Endpoints live under `/api/v1`. Scenario creation and duplication return
//! 201, unknown resources 404, malformed requests 400, and conflicts (active
//! runs, duplicate ids, cache misses) 409.

mod errors;
mod handlers;
mod responses;

pub use errors::ApiError;
pub use handlers::ApiState;
pub use responses::*;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::EngineConfig;

/// Build the API router with all endpoints.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(handlers::health))
        // Scenarios
        .route(
            "/api/v1/scenarios",
            get(handlers::list_scenarios).post(handlers::create_scenario),
        )
        .route(
            "/api/v1/scenarios/{id}",
            get(handlers::get_scenario).delete(handlers::delete_scenario),
        )
        .route(
            "/api/v1/scenarios/{id}/duplicate",
            post(handlers::duplicate_scenario),
        )
        .route(
            "/api/v1/scenarios/{id}/submit",
            post(handlers::submit_scenario),
        )
        .route(
            "/api/v1/scenarios/{id}/cancel",
            post(handlers::cancel_scenario),
        )
        .route(
            "/api/v1/scenarios/{id}/jobs",
            get(handlers::list_scenario_jobs),
        )
        .route(
            "/api/v1/scenarios/{id}/data_nodes/{node_id}",
            put(handlers::set_data_node),
        )
        // Jobs
        .route("/api/v1/jobs/{id}", get(handlers::get_job))
        // Cycles
        .route(
            "/api/v1/cycles",
            get(handlers::list_cycles).post(handlers::create_cycle),
        )
        .route(
            "/api/v1/cycles/{id}",
            get(handlers::get_cycle).delete(handlers::delete_cycle),
        )
        .route(
            "/api/v1/cycles/{cycle_id}/scenarios/{scenario_id}",
            post(handlers::attach_scenario_to_cycle)
                .delete(handlers::detach_scenario_from_cycle),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the API server.
///
/// Spawns the server and returns a handle to the task. The server runs
/// until the task is aborted or the process exits.
pub async fn start_server(
    config: &EngineConfig,
    state: ApiState,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let router = build_router(state);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("API server listening on http://{}", addr);
    }

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(handle)
}

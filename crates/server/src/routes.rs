pub mod jobs;
pub mod protocols;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;

use common::types::Health;

use crate::admin;
use crate::metrics;
use crate::openapi::ApiDoc;
use crate::startup::ServerState;

#[utoipa::path(
    get, path = "/health", tag = "health",
    responses((status = 200, description = "Service is up", body = crate::openapi::HealthResponse))
)]
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the full application router: health and metrics, read-only protocol routes and
/// the mutating routes guarded by the admin key.
pub fn build_router(state: ServerState, cors: CorsLayer) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics))
        .route("/openapi.json", get(openapi_json));

    let read = Router::new()
        .route("/api/protocols", get(protocols::list))
        .route("/api/protocols/:name", get(protocols::get))
        .route("/api/protocols/:name/status", get(protocols::status))
        .route("/api/jobs/:id", get(jobs::get));

    let mutate = Router::new()
        .route("/api/protocols/:name/install", post(protocols::install))
        .route("/api/protocols/:name/uninstall", delete(protocols::uninstall))
        .route("/api/protocols/:name/start", post(protocols::start))
        .route("/api/protocols/:name/stop", post(protocols::stop))
        .route("/api/protocols/:name/restart", post(protocols::restart))
        .route("/api/protocols/:name/config", put(protocols::update_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin::require_api_key));

    public
        .merge(read)
        .merge(mutate)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                // 5xx responses are logged at ERROR
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

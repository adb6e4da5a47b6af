use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use models::protocol::Model;
use serde::Serialize;
use service::lifecycle::{ConfigUpdate, InstallOutcome, StatusReport, UninstallOutcome};
use tracing::info;
use uuid::Uuid;

use crate::errors::JsonApiError;
use crate::startup::ServerState;

/// Body returned by install and uninstall.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub protocol: Model,
}

#[utoipa::path(
    get, path = "/api/protocols", tag = "protocols",
    responses(
        (status = 200, description = "All protocols", body = [crate::openapi::ProtocolDoc]),
        (status = 500, description = "Store Error")
    )
)]
pub async fn list(State(state): State<ServerState>) -> Result<Json<Vec<Model>>, JsonApiError> {
    Ok(Json(state.orchestrator.list().await?))
}

#[utoipa::path(
    get, path = "/api/protocols/{name}", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 200, description = "OK", body = crate::openapi::ProtocolDoc),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<Model>, JsonApiError> {
    Ok(Json(state.orchestrator.get(&name).await?))
}

#[utoipa::path(
    get, path = "/api/protocols/{name}/status", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 200, description = "Stored state merged with the live service state", body = crate::openapi::StatusDoc),
        (status = 404, description = "Not Found")
    )
)]
pub async fn status(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<StatusReport>, JsonApiError> {
    Ok(Json(state.orchestrator.get_status(&name).await?))
}

#[utoipa::path(
    post, path = "/api/protocols/{name}/install", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 202, description = "Install job accepted"),
        (status = 200, description = "Already installed"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn install(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<LifecycleResponse>), JsonApiError> {
    match state.orchestrator.install(&name).await? {
        InstallOutcome::Accepted(ticket) => {
            info!(protocol = %name, job_id = %ticket.id, "install_accepted");
            let protocol = state.orchestrator.get(&name).await?;
            let body = LifecycleResponse {
                message: format!("{name} installation started"),
                job_id: Some(ticket.id),
                protocol,
            };
            Ok((StatusCode::ACCEPTED, Json(body)))
        }
        InstallOutcome::AlreadyInstalled(protocol) => {
            let body = LifecycleResponse { message: format!("{name} is already installed"), job_id: None, protocol };
            Ok((StatusCode::OK, Json(body)))
        }
    }
}

#[utoipa::path(
    delete, path = "/api/protocols/{name}/uninstall", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 202, description = "Uninstall job accepted"),
        (status = 200, description = "Not installed"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn uninstall(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<LifecycleResponse>), JsonApiError> {
    match state.orchestrator.uninstall(&name).await? {
        UninstallOutcome::Accepted(ticket) => {
            info!(protocol = %name, job_id = %ticket.id, "uninstall_accepted");
            let protocol = state.orchestrator.get(&name).await?;
            let body = LifecycleResponse {
                message: format!("{name} uninstallation started"),
                job_id: Some(ticket.id),
                protocol,
            };
            Ok((StatusCode::ACCEPTED, Json(body)))
        }
        UninstallOutcome::NotInstalled(protocol) => {
            let body = LifecycleResponse { message: format!("{name} is not installed"), job_id: None, protocol };
            Ok((StatusCode::OK, Json(body)))
        }
    }
}

#[utoipa::path(
    post, path = "/api/protocols/{name}/start", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 200, description = "Started", body = crate::openapi::ProtocolDoc),
        (status = 400, description = "Not installed"),
        (status = 409, description = "Another operation is in progress"),
        (status = 500, description = "Operation Failed")
    )
)]
pub async fn start(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<Model>, JsonApiError> {
    Ok(Json(state.orchestrator.start(&name).await?))
}

#[utoipa::path(
    post, path = "/api/protocols/{name}/stop", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 200, description = "Stopped", body = crate::openapi::ProtocolDoc),
        (status = 400, description = "Not installed"),
        (status = 409, description = "Another operation is in progress"),
        (status = 500, description = "Operation Failed")
    )
)]
pub async fn stop(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<Model>, JsonApiError> {
    Ok(Json(state.orchestrator.stop(&name).await?))
}

#[utoipa::path(
    post, path = "/api/protocols/{name}/restart", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    responses(
        (status = 200, description = "Restarted", body = crate::openapi::ProtocolDoc),
        (status = 400, description = "Not installed"),
        (status = 409, description = "Another operation is in progress"),
        (status = 500, description = "Operation Failed")
    )
)]
pub async fn restart(State(state): State<ServerState>, Path(name): Path<String>) -> Result<Json<Model>, JsonApiError> {
    Ok(Json(state.orchestrator.restart(&name).await?))
}

#[utoipa::path(
    put, path = "/api/protocols/{name}/config", tag = "protocols",
    params(("name" = String, Path, description = "Protocol identifier")),
    request_body = crate::openapi::ConfigUpdateDoc,
    responses(
        (status = 200, description = "Updated", body = crate::openapi::ProtocolDoc),
        (status = 400, description = "Validation Error"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Reconfigure Failed")
    )
)]
pub async fn update_config(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    Json(input): Json<ConfigUpdate>,
) -> Result<Json<Model>, JsonApiError> {
    info!(protocol = %name, port = ?input.port, ssl_enabled = ?input.ssl_enabled, "config_update_request");
    Ok(Json(state.orchestrator.update_config(&name, input).await?))
}

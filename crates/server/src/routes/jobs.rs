use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use service::jobs::JobInfo;
use uuid::Uuid;

use crate::errors::JsonApiError;
use crate::startup::ServerState;

#[utoipa::path(
    get, path = "/api/jobs/{id}", tag = "jobs",
    params(("id" = Uuid, Path, description = "Job ID returned by install or uninstall")),
    responses(
        (status = 200, description = "OK", body = crate::openapi::JobDoc),
        (status = 404, description = "Unknown or expired job")
    )
)]
pub async fn get(State(state): State<ServerState>, Path(id): Path<Uuid>) -> Result<Json<JobInfo>, JsonApiError> {
    state
        .orchestrator
        .job(id)
        .map(Json)
        .ok_or_else(|| JsonApiError::new(StatusCode::NOT_FOUND, "Not Found", Some(format!("job {id} not found"))))
}

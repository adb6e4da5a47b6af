use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use service::errors::LifecycleError;
use tracing::error;

/// JSON error body: `{"error": <short reason>, "message": <detail>}`.
#[derive(Debug)]
pub struct JsonApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: Option<String>,
}

impl JsonApiError {
    pub fn new(status: StatusCode, error: &'static str, message: Option<String>) -> Self {
        Self { status, error, message }
    }
}

impl IntoResponse for JsonApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = self.error, message = ?self.message, "request failed");
        }
        let body = serde_json::json!({ "error": self.error, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<LifecycleError> for JsonApiError {
    fn from(e: LifecycleError) -> Self {
        let (status, error) = match &e {
            LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            LifecycleError::Busy(_) => (StatusCode::CONFLICT, "Busy"),
            LifecycleError::PreconditionFailed(_) => (StatusCode::BAD_REQUEST, "Precondition Failed"),
            LifecycleError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Validation Error"),
            LifecycleError::OperationFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Operation Failed"),
            LifecycleError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Store Error"),
        };
        JsonApiError::new(status, error, Some(e.to_string()))
    }
}

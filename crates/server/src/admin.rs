use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::startup::ServerState;

/// Middleware: require `X-API-Key` (or query `api_key`) to match the configured admin key.
/// With no key configured every request passes.
pub async fn require_api_key(State(state): State<ServerState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = state.admin_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let key = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| {
            // fallback to query param
            req.uri().query().and_then(|q| {
                q.split('&').find_map(|pair| {
                    let mut it = pair.splitn(2, '=');
                    match (it.next(), it.next()) {
                        (Some("api_key"), Some(v)) => Some(v.to_string()),
                        _ => None,
                    }
                })
            })
        });

    match key {
        Some(k) if !k.trim().is_empty() && bool::from(k.as_bytes().ct_eq(expected.as_bytes())) => {
            Ok(next.run(req).await)
        }
        _ => {
            warn!(path = %req.uri().path(), "rejected request without a valid admin key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

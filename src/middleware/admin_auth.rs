use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::AppError;

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Reject the request unless it carries `Authorization: Bearer <ADMIN_TOKEN>`.
/// With no admin token configured every request is rejected.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        tracing::warn!(path = %request.uri().path(), "Admin route called but ADMIN_TOKEN is not set");
        return Err(AppError::Unauthorized);
    };

    let provided = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request with wrong token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

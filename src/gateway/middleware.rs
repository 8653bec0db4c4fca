use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::state::AppState;
use super::types::{ApiError, error_codes};
use crate::auth::Actor;

/// Verify `Authorization: Bearer <jwt>` and inject the [`Actor`]
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                error_codes::MISSING_AUTH,
                "Missing Authorization header",
            )
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            error_codes::AUTH_FAILED,
            "Invalid token format",
        )
    })?;

    let actor = state.tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Token rejected");
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            error_codes::AUTH_FAILED,
            "Invalid or expired token",
        )
    })?;

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

/// Layered after [`jwt_auth_middleware`]; rejects non-admin actors early
pub async fn admin_only_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    match request.extensions().get::<Actor>() {
        Some(actor) if actor.is_admin() => Ok(next.run(request).await),
        Some(_) => Err(ApiError::new(
            StatusCode::FORBIDDEN,
            error_codes::FORBIDDEN,
            "admin role required",
        )),
        None => Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            error_codes::MISSING_AUTH,
            "not authenticated",
        )),
    }
}

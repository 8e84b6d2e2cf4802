//! Authentication middleware: Bearer token extraction and JWT verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use bazaar_core::auth::jwt::{TokenClaims, TokenError, TokenKind};
use tracing::debug;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;

/// The verified caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub claims: TokenClaims,
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies it as an
/// access token and injects [`AuthenticatedUser`] into request extensions.
///
/// Refresh-kind JWTs are rejected here.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("auth.missing_token", "Missing authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("auth.invalid_scheme", "Invalid authorization scheme"))?;

    let claims = state.jwt.validate(token.trim(), TokenKind::Access).map_err(|e| {
        debug!(error = %e, "Rejected bearer token");
        match e {
            TokenError::Expired => AppError::unauthorized("auth.token_expired", "Token has expired"),
            _ => AppError::unauthorized("auth.invalid_token", "Invalid token"),
        }
    })?;
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::unauthorized("auth.invalid_token", "Invalid token"))?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id, claims });

    Ok(next.run(request).await)
}

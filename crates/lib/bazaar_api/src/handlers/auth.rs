//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use bazaar_core::auth::account::{AuthTokens, RegisterCommand};
use bazaar_core::auth::refresh_tokens::RefreshTokenSession;
use chrono::Utc;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ExternalLoginRequest, LoginRequest, LogoutAllResponse, LogoutResponse, MeResponse,
    RefreshTokenRequest,
};
use crate::response::ApiResponse;
use crate::services::client_ip::ClientIp;
use crate::services::cookies::{REFRESH_COOKIE, clear_refresh_cookie, refresh_cookie};

type TokenResponse = (CookieJar, Json<ApiResponse<AuthTokens>>);

fn with_cookie(state: &AppState, jar: CookieJar, tokens: AuthTokens) -> TokenResponse {
    let max_age = (tokens.refresh_token_expires_at - Utc::now()).num_seconds();
    let jar = jar.add(refresh_cookie(
        &tokens.refresh_token,
        max_age,
        state.config.secure_cookies,
    ));
    (jar, Json(ApiResponse::ok(tokens)))
}

/// Token from the body, else from the cookie.
fn presented_token(jar: &CookieJar, body: Option<RefreshTokenRequest>) -> Option<String> {
    body.and_then(|b| b.refresh_token)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
}

/// `POST /auth/register`: create an account and sign in.
pub async fn register_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    jar: CookieJar,
    Json(body): Json<RegisterCommand>,
) -> AppResult<TokenResponse> {
    let tokens = state.accounts.register(body, ip.as_deref()).await?;
    Ok(with_cookie(&state, jar, tokens))
}

/// `POST /auth/login/password`: sign in with email or user name.
pub async fn login_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<TokenResponse> {
    let tokens = state
        .accounts
        .login_with_password(&body.login, &body.password, ip.as_deref())
        .await?;
    Ok(with_cookie(&state, jar, tokens))
}

/// `POST /auth/login/external`: sign in with a Google or Facebook token.
pub async fn external_login_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    jar: CookieJar,
    Json(body): Json<ExternalLoginRequest>,
) -> AppResult<TokenResponse> {
    let tokens = state
        .accounts
        .external_login(body.provider, &body.access_token, ip.as_deref())
        .await?;
    Ok(with_cookie(&state, jar, tokens))
}

/// `POST /auth/refresh`: rotate the refresh token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    jar: CookieJar,
    body: Option<Json<RefreshTokenRequest>>,
) -> AppResult<TokenResponse> {
    let token = presented_token(&jar, body.map(|Json(b)| b)).ok_or_else(|| {
        AppError::unauthorized("auth.refresh_token_missing", "A refresh token is required")
    })?;
    let tokens = state.accounts.refresh(&token, ip.as_deref()).await?;
    Ok(with_cookie(&state, jar, tokens))
}

/// `POST /auth/logout`: revoke the presented refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    jar: CookieJar,
    body: Option<Json<RefreshTokenRequest>>,
) -> AppResult<(CookieJar, Json<ApiResponse<LogoutResponse>>)> {
    let revoked = match presented_token(&jar, body.map(|Json(b)| b)) {
        Some(token) => state.accounts.logout(&token, ip.as_deref()).await?,
        None => false,
    };
    let jar = jar.add(clear_refresh_cookie(state.config.secure_cookies));
    Ok((jar, Json(ApiResponse::ok(LogoutResponse { revoked }))))
}

/// `POST /auth/logout/all`: revoke every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    ip: ClientIp,
    jar: CookieJar,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<(CookieJar, Json<ApiResponse<LogoutAllResponse>>)> {
    let revoked = state.accounts.logout_all(user.user_id, ip.as_deref()).await?;
    let jar = jar.add(clear_refresh_cookie(state.config.secure_cookies));
    Ok((jar, Json(ApiResponse::ok(LogoutAllResponse { revoked }))))
}

/// `GET /auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    let data = state.accounts.me(user.user_id).await?;
    Ok(Json(ApiResponse::ok(MeResponse {
        user: data,
        is_system: user.claims.sys,
    })))
}

/// `GET /auth/sessions`
pub async fn sessions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiResponse<Vec<RefreshTokenSession>>>> {
    let sessions = state.accounts.sessions(user.user_id).await?;
    Ok(Json(ApiResponse::ok(sessions)))
}

//! Role administration handlers.

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{RoleDto, SetUserRolesRequest, UserRolesResponse};
use crate::response::ApiResponse;

/// `GET /api/admin/roles`
pub async fn list_roles(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<RoleDto>>>> {
    let roles = state.accounts.list_roles().await?;
    Ok(Json(ApiResponse::ok(roles.into_iter().map(RoleDto::from).collect())))
}

/// `PUT /api/admin/users/{id}/roles`: replace the user's roles.
pub async fn set_user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<SetUserRolesRequest>,
) -> AppResult<Json<ApiResponse<UserRolesResponse>>> {
    let roles = state.accounts.set_user_roles(user_id, &body.roles).await?;
    Ok(Json(ApiResponse::ok(UserRolesResponse { user_id, roles })))
}

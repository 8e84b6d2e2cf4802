//! Todo list request handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use bazaar_core::todos::{CreateTodoList, UpdateTodoList};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{ListQueryParams, TodoListDetailsDto, TodoListDto};
use crate::response::ApiResponse;

/// `GET /api/todos/lists`
pub async fn query_lists(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> AppResult<Json<ApiResponse<Vec<TodoListDto>>>> {
    let page = state.lists.query(&params.into()).await?;
    Ok(Json(ApiResponse::paged(page, TodoListDto::from)))
}

/// `POST /api/todos/lists`
pub async fn create_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateTodoList>,
) -> AppResult<(StatusCode, Json<ApiResponse<TodoListDto>>)> {
    let list = state.lists.create(body, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(list.into()))))
}

/// `GET /api/todos/lists/{id}`: the list with its items.
pub async fn get_list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TodoListDetailsDto>>> {
    let details = state.lists.get(id).await?;
    Ok(Json(ApiResponse::ok(details.into())))
}

/// `PUT /api/todos/lists/{id}`
pub async fn update_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTodoList>,
) -> AppResult<Json<ApiResponse<TodoListDto>>> {
    let list = state.lists.update(id, body, Some(user.user_id)).await?;
    Ok(Json(ApiResponse::ok(list.into())))
}

/// `DELETE /api/todos/lists/{id}`: removes the list and its items.
pub async fn delete_list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.lists.delete(id).await?;
    Ok(Json(ApiResponse::message("Todo list deleted")))
}

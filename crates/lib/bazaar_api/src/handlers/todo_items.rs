//! Todo item request handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use bazaar_core::todos::{CreateTodoItem, UpdateTodoItem};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{ItemQueryParams, TodoItemDto};
use crate::response::ApiResponse;

/// `GET /api/todos/items`
pub async fn query_items(
    State(state): State<AppState>,
    Query(params): Query<ItemQueryParams>,
) -> AppResult<Json<ApiResponse<Vec<TodoItemDto>>>> {
    let page = state.items.query(&params.into()).await?;
    Ok(Json(ApiResponse::paged(page, TodoItemDto::from)))
}

/// `POST /api/todos/items`
pub async fn create_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<CreateTodoItem>,
) -> AppResult<(StatusCode, Json<ApiResponse<TodoItemDto>>)> {
    let item = state.items.create(body, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item.into()))))
}

/// `GET /api/todos/items/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TodoItemDto>>> {
    let item = state.items.get(id).await?;
    Ok(Json(ApiResponse::ok(item.into())))
}

/// `PUT /api/todos/items/{id}`
pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTodoItem>,
) -> AppResult<Json<ApiResponse<TodoItemDto>>> {
    let item = state.items.update(id, body, Some(user.user_id)).await?;
    Ok(Json(ApiResponse::ok(item.into())))
}

/// `POST /api/todos/items/{id}/done`: 409 if already done.
pub async fn complete_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TodoItemDto>>> {
    let item = state.items.complete(id, Some(user.user_id)).await?;
    Ok(Json(ApiResponse::ok(item.into())))
}

/// `DELETE /api/todos/items/{id}`
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.items.delete(id).await?;
    Ok(Json(ApiResponse::message("Todo item deleted")))
}

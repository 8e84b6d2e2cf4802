//! Request and response bodies.

use bazaar_core::auth::external::ExternalProvider;
use bazaar_core::models::auth::{Role, UserAuthorizationData};
use bazaar_core::models::paging::PageRequest;
use bazaar_core::models::todo::{Colour, Priority, TodoItem, TodoList};
use bazaar_core::todos::TodoListDetails;
use bazaar_core::todos::query::{
    SortDirection, TodoItemFilter, TodoItemQuery, TodoItemSortField, TodoListQuery,
    TodoListSortField,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email or user name.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoginRequest {
    pub provider: ExternalProvider,
    pub access_token: String,
}

/// Body of refresh and logout. The token may come from the cookie instead.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub revoked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserAuthorizationData,
    pub is_system: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDto {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_system: bool,
}

impl From<Role> for RoleDto {
    fn from(r: Role) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            is_system: r.is_system,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetUserRolesRequest {
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRolesResponse {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub backend: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListDto {
    pub id: Uuid,
    pub title: String,
    pub colour: Colour,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<Uuid>,
}

impl From<TodoList> for TodoListDto {
    fn from(l: TodoList) -> Self {
        Self {
            id: l.id,
            title: l.title,
            colour: l.colour,
            created_at: l.audit.created_at,
            created_by: l.audit.created_by,
            last_modified_at: l.audit.last_modified_at,
            last_modified_by: l.audit.last_modified_by,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListDetailsDto {
    #[serde(flatten)]
    pub list: TodoListDto,
    pub items: Vec<TodoItemDto>,
}

impl From<TodoListDetails> for TodoListDetailsDto {
    fn from(d: TodoListDetails) -> Self {
        Self {
            list: d.list.into(),
            items: d.items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItemDto {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub note: Option<String>,
    pub priority: Priority,
    pub done: bool,
    pub done_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<Uuid>,
}

impl From<TodoItem> for TodoItemDto {
    fn from(i: TodoItem) -> Self {
        Self {
            id: i.id,
            list_id: i.list_id,
            title: i.title,
            note: i.note,
            priority: i.priority,
            done: i.done,
            done_at: i.done_at,
            created_at: i.audit.created_at,
            created_by: i.audit.created_by,
            last_modified_at: i.audit.last_modified_at,
            last_modified_by: i.audit.last_modified_by,
        }
    }
}

/// `GET /api/todos/lists` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQueryParams {
    pub search: Option<String>,
    #[serde(default)]
    pub sort: TodoListSortField,
    #[serde(default)]
    pub direction: SortDirection,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<ListQueryParams> for TodoListQuery {
    fn from(p: ListQueryParams) -> Self {
        Self {
            search: p.search,
            sort: p.sort,
            direction: p.direction,
            page: PageRequest::new(p.page, p.page_size),
        }
    }
}

/// `GET /api/todos/items` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQueryParams {
    pub list_id: Option<Uuid>,
    pub done: Option<bool>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: TodoItemSortField,
    #[serde(default)]
    pub direction: SortDirection,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<ItemQueryParams> for TodoItemQuery {
    fn from(p: ItemQueryParams) -> Self {
        Self {
            filter: TodoItemFilter {
                list_id: p.list_id,
                done: p.done,
                priority: p.priority,
                search: p.search,
            },
            sort: p.sort,
            direction: p.direction,
            page: PageRequest::new(p.page, p.page_size),
        }
    }
}

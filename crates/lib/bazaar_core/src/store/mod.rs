//! Persistence traits and backends.
//!
//! Every read and write goes through a [`Transaction`] obtained from a
//! [`Database`]; multi-step use cases wrap theirs in a
//! [`uow::UnitOfWork`]. Two backends exist: [`postgres::PgDatabase`] and
//! [`memory::MemoryDatabase`].

pub mod memory;
pub mod postgres;
pub mod uow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{NewRole, NewUser, RefreshToken, Role, RoleClaim, User};
use crate::models::paging::Page;
use crate::models::todo::{TodoItem, TodoList};
use crate::todos::query::{TodoItemQuery, TodoListQuery};

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Duplicate value: {0}")]
    UniqueViolation(String),

    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    #[error("A transaction is already open on this unit of work")]
    NestedTransaction,

    #[error("Row not found: {0}")]
    NotFound(String),

    #[cfg(any(test, feature = "testing"))]
    #[error("Injected fault: {0}")]
    Injected(&'static str),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            let constraint = db.constraint().unwrap_or("constraint").to_string();
            match db.code().as_deref() {
                Some("23505") => return StoreError::UniqueViolation(constraint),
                Some("23503") => return StoreError::NotFound(format!("referenced row ({constraint})")),
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => return StoreError::Conflict(db.message().to_string()),
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

/// Contact channel used to match notification receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Email,
    Phone,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive email lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive lookup by email or user name.
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] on duplicate email or user name.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_count(&self) -> Result<u64, StoreError>;

    /// Serialize first-account bootstrap until the transaction ends. Must be
    /// taken before [`UserRepository::user_count`] decides who becomes admin.
    async fn lock_user_bootstrap(&self) -> Result<(), StoreError>;

    async fn record_sign_in(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Users whose email (or phone) matches any of `contacts`, case-insensitively.
    async fn find_users_by_contacts(
        &self,
        kind: ContactKind,
        contacts: &[String],
    ) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    /// Insert a role, or update description/system flag of the existing one.
    async fn upsert_role(&self, role: NewRole) -> Result<Role, StoreError>;

    /// Idempotent.
    async fn add_role_claim(&self, role_id: Uuid, claim: &RoleClaim) -> Result<(), StoreError>;

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError>;

    /// Every claim of every role.
    async fn all_role_claims(&self) -> Result<Vec<RoleClaim>, StoreError>;

    /// Replace the user's role membership.
    async fn set_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError>;

    async fn find_refresh_token_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError>;

    /// Mark a token revoked. Returns false if it was already revoked.
    async fn revoke_refresh_token(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip: Option<&str>,
        replaced_by: Option<Uuid>,
    ) -> Result<bool, StoreError>;

    /// Revoke every unrevoked token of a user. Returns the number revoked.
    async fn revoke_user_refresh_tokens(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, StoreError>;

    async fn list_user_refresh_tokens(&self, user_id: Uuid)
    -> Result<Vec<RefreshToken>, StoreError>;

    /// Delete tokens that are revoked or expired at `now`.
    async fn delete_stale_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn insert_list(&self, list: &TodoList) -> Result<(), StoreError>;
    async fn find_list(&self, id: Uuid) -> Result<Option<TodoList>, StoreError>;
    async fn update_list(&self, list: &TodoList) -> Result<(), StoreError>;
    async fn delete_list(&self, id: Uuid) -> Result<(), StoreError>;
    async fn query_lists(&self, query: &TodoListQuery) -> Result<Page<TodoList>, StoreError>;

    async fn insert_item(&self, item: &TodoItem) -> Result<(), StoreError>;
    async fn find_item(&self, id: Uuid) -> Result<Option<TodoItem>, StoreError>;
    async fn update_item(&self, item: &TodoItem) -> Result<(), StoreError>;
    async fn delete_item(&self, id: Uuid) -> Result<(), StoreError>;
    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<TodoItem>, StoreError>;
    async fn query_items(&self, query: &TodoItemQuery) -> Result<Page<TodoItem>, StoreError>;
}

/// An open transaction exposing every repository.
///
/// Dropping it without calling [`Transaction::commit`] discards its changes.
#[async_trait]
pub trait Transaction:
    UserRepository + RoleRepository + RefreshTokenRepository + TodoRepository + Send + Sync
{
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A storage backend.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// Connectivity check for health endpoints.
    async fn ping(&self) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;
}

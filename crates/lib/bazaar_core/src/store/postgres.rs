//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ContactKind, Database, RefreshTokenRepository, RoleRepository, StoreError, TodoRepository,
    Transaction, UserRepository,
};
use crate::models::auth::{ClaimType, NewRole, NewUser, RefreshToken, Role, RoleClaim, User};
use crate::models::paging::Page;
use crate::models::todo::{Audit, Colour, Priority, TodoItem, TodoList};
use crate::todos::query::{TodoItemQuery, TodoListQuery, like_pattern};
use crate::uuid::uuidv7;

/// Advisory lock key held while deciding whether a new account is the first.
const USER_BOOTSTRAP_LOCK: i64 = 0x6261_7a61_6172;

const USER_COLUMNS: &str = "id, user_name, email, phone_number, password_hash, created_at, \
                            last_sign_in_ip, last_sign_in_at";
const ROLE_COLUMNS: &str = "id, name, description, is_system, created_at, created_by";
const TOKEN_COLUMNS: &str = "id, user_id, token_hash, created_at, created_by_ip, expires_at, \
                             revoked_at, revoked_by_ip, replaced_by_token";
const LIST_COLUMNS: &str = "id, title, colour, created_at, created_by, last_modified_at, \
                            last_modified_by";
const ITEM_COLUMNS: &str = "id, list_id, title, note, priority, done, done_at, created_at, \
                            created_by, last_modified_at, last_modified_by";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    user_name: String,
    email: String,
    phone_number: Option<String>,
    password_hash: Option<String>,
    created_at: DateTime<Utc>,
    last_sign_in_ip: Option<String>,
    last_sign_in_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            user_name: r.user_name,
            email: r.email,
            phone_number: r.phone_number,
            password_hash: r.password_hash,
            created_at: r.created_at,
            last_sign_in_ip: r.last_sign_in_ip,
            last_sign_in_at: r.last_sign_in_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: String,
    is_system: bool,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
}

impl From<RoleRow> for Role {
    fn from(r: RoleRow) -> Self {
        Role {
            id: r.id,
            name: r.name,
            description: r.description,
            is_system: r.is_system,
            created_at: r.created_at,
            created_by: r.created_by,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
    created_by_ip: Option<String>,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by_ip: Option<String>,
    replaced_by_token: Option<Uuid>,
}

impl From<TokenRow> for RefreshToken {
    fn from(r: TokenRow) -> Self {
        RefreshToken {
            id: r.id,
            user_id: r.user_id,
            token_hash: r.token_hash,
            created_at: r.created_at,
            created_by_ip: r.created_by_ip,
            expires_at: r.expires_at,
            revoked_at: r.revoked_at,
            revoked_by_ip: r.revoked_by_ip,
            replaced_by_token: r.replaced_by_token,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: Uuid,
    title: String,
    colour: String,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    last_modified_at: Option<DateTime<Utc>>,
    last_modified_by: Option<Uuid>,
}

impl From<ListRow> for TodoList {
    fn from(r: ListRow) -> Self {
        TodoList {
            id: r.id,
            title: r.title,
            // Rows are written through `Colour::code`; anything else falls back.
            colour: Colour::from_code(&r.colour).unwrap_or_default(),
            audit: Audit {
                created_at: r.created_at,
                created_by: r.created_by,
                last_modified_at: r.last_modified_at,
                last_modified_by: r.last_modified_by,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    list_id: Uuid,
    title: String,
    note: Option<String>,
    priority: i16,
    done: bool,
    done_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    last_modified_at: Option<DateTime<Utc>>,
    last_modified_by: Option<Uuid>,
}

impl From<ItemRow> for TodoItem {
    fn from(r: ItemRow) -> Self {
        TodoItem {
            id: r.id,
            list_id: r.list_id,
            title: r.title,
            note: r.note,
            priority: Priority::from_i16(r.priority),
            done: r.done,
            done_at: r.done_at,
            audit: Audit {
                created_at: r.created_at,
                created_by: r.created_by,
                last_modified_at: r.last_modified_at,
                last_modified_by: r.last_modified_by,
            },
        }
    }
}

/// Pool-backed database.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx: Mutex::new(tx) }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// An open PostgreSQL transaction. Dropping it rolls back.
pub struct PgTransaction {
    tx: Mutex<sqlx::Transaction<'static, Postgres>>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgTransaction {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE lower(email) = lower($1) OR lower(user_name) = lower($1) \
             LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, user_name, email, phone_number, password_hash) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.into())
    }

    async fn user_count(&self) -> Result<u64, StoreError> {
        let mut tx = self.tx.lock().await;
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut **tx)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn lock_user_bootstrap(&self) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(USER_BOOTSTRAP_LOCK)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn record_sign_in(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(
            "UPDATE users SET last_sign_in_ip = $2, last_sign_in_at = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(ip)
        .bind(at)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    async fn find_users_by_contacts(
        &self,
        kind: ContactKind,
        contacts: &[String],
    ) -> Result<Vec<User>, StoreError> {
        let column = match kind {
            ContactKind::Email => "email",
            ContactKind::Phone => "phone_number",
        };
        let wanted: Vec<String> = contacts.iter().map(|c| c.trim().to_lowercase()).collect();
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower({column}) = ANY($1) ORDER BY created_at"
        ))
        .bind(wanted)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl RoleRepository for PgTransaction {
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles ORDER BY name"
        ))
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(Role::from))
    }

    async fn upsert_role(&self, role: NewRole) -> Result<Role, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "INSERT INTO roles (id, name, description, is_system) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name) DO UPDATE \
             SET description = EXCLUDED.description, is_system = EXCLUDED.is_system \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(uuidv7())
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_system)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.into())
    }

    async fn add_role_claim(&self, role_id: Uuid, claim: &RoleClaim) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        sqlx::query(
            "INSERT INTO role_claims (role_id, claim_type, claim_value) VALUES ($1, $2, $3) \
             ON CONFLICT (role_id, claim_type, claim_value) DO NOTHING",
        )
        .bind(role_id)
        .bind(claim.claim_type.as_str())
        .bind(&claim.claim_value)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT r.id, r.name, r.description, r.is_system, r.created_at, r.created_by \
             FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn all_role_claims(&self) -> Result<Vec<RoleClaim>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT r.name, rc.claim_type, rc.claim_value \
             FROM role_claims rc JOIN roles r ON r.id = rc.role_id",
        )
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(role_name, claim_type, claim_value)| {
                ClaimType::parse(&claim_type).map(|claim_type| RoleClaim {
                    role_name,
                    claim_type,
                    claim_value,
                })
            })
            .collect())
    }

    async fn set_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, unnest($2::uuid[])")
            .bind(user_id)
            .bind(role_ids.to_vec())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for PgTransaction {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, user_id, token_hash, created_at, created_by_ip, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(&token.created_by_ip)
        .bind(token.expires_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(RefreshToken::from))
    }

    async fn find_refresh_token_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(RefreshToken::from))
    }

    async fn revoke_refresh_token(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip: Option<&str>,
        replaced_by: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(
            "UPDATE refresh_tokens \
             SET revoked_at = $2, revoked_by_ip = $3, replaced_by_token = $4 \
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .bind(ip)
        .bind(replaced_by)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_user_refresh_tokens(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2, revoked_by_ip = $3 \
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .bind(ip)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_user_refresh_tokens(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE user_id = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(RefreshToken::from).collect())
    }

    async fn delete_stale_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE revoked_at IS NOT NULL OR expires_at <= $1",
        )
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}

fn push_list_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &TodoListQuery) {
    qb.push(" WHERE TRUE");
    if let Some(pattern) = like_pattern(&query.search) {
        qb.push(" AND title ILIKE ").push_bind(pattern);
    }
}

fn push_item_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &TodoItemQuery) {
    let f = &query.filter;
    qb.push(" WHERE TRUE");
    if let Some(list_id) = f.list_id {
        qb.push(" AND list_id = ").push_bind(list_id);
    }
    if let Some(done) = f.done {
        qb.push(" AND done = ").push_bind(done);
    }
    if let Some(priority) = f.priority {
        qb.push(" AND priority = ").push_bind(priority.as_i16());
    }
    if let Some(pattern) = query.search_pattern() {
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR note ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl TodoRepository for PgTransaction {
    async fn insert_list(&self, list: &TodoList) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        sqlx::query(
            "INSERT INTO todo_lists (id, title, colour, created_at, created_by) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(list.id)
        .bind(&list.title)
        .bind(list.colour.code())
        .bind(list.audit.created_at)
        .bind(list.audit.created_by)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_list(&self, id: Uuid) -> Result<Option<TodoList>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, ListRow>(&format!(
            "SELECT {LIST_COLUMNS} FROM todo_lists WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(TodoList::from))
    }

    async fn update_list(&self, list: &TodoList) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(
            "UPDATE todo_lists SET title = $2, colour = $3, last_modified_at = $4, \
             last_modified_by = $5 WHERE id = $1",
        )
        .bind(list.id)
        .bind(&list.title)
        .bind(list.colour.code())
        .bind(list.audit.last_modified_at)
        .bind(list.audit.last_modified_by)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("todo list {}", list.id)));
        }
        Ok(())
    }

    async fn delete_list(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query("DELETE FROM todo_lists WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("todo list {id}")));
        }
        Ok(())
    }

    async fn query_lists(&self, query: &TodoListQuery) -> Result<Page<TodoList>, StoreError> {
        let mut tx = self.tx.lock().await;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM todo_lists");
        push_list_filters(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut **tx)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {LIST_COLUMNS} FROM todo_lists"));
        push_list_filters(&mut select, query);
        select
            .push(format!(
                " ORDER BY {} {}, id",
                query.sort.column(),
                query.direction.sql()
            ))
            .push(" LIMIT ")
            .push_bind(query.page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);
        let rows = select
            .build_query_as::<ListRow>()
            .fetch_all(&mut **tx)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(TodoList::from).collect(),
            query.page,
            total.max(0) as u64,
        ))
    }

    async fn insert_item(&self, item: &TodoItem) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        sqlx::query(
            "INSERT INTO todo_items \
             (id, list_id, title, note, priority, done, done_at, created_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(item.id)
        .bind(item.list_id)
        .bind(&item.title)
        .bind(&item.note)
        .bind(item.priority.as_i16())
        .bind(item.done)
        .bind(item.done_at)
        .bind(item.audit.created_at)
        .bind(item.audit.created_by)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_item(&self, id: Uuid) -> Result<Option<TodoItem>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM todo_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(TodoItem::from))
    }

    async fn update_item(&self, item: &TodoItem) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query(
            "UPDATE todo_items SET title = $2, note = $3, priority = $4, done = $5, \
             done_at = $6, last_modified_at = $7, last_modified_by = $8 WHERE id = $1",
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.note)
        .bind(item.priority.as_i16())
        .bind(item.done)
        .bind(item.done_at)
        .bind(item.audit.last_modified_at)
        .bind(item.audit.last_modified_by)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("todo item {}", item.id)));
        }
        Ok(())
    }

    async fn delete_item(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.tx.lock().await;
        let result = sqlx::query("DELETE FROM todo_items WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("todo item {id}")));
        }
        Ok(())
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<TodoItem>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM todo_items WHERE list_id = $1 ORDER BY created_at, id"
        ))
        .bind(list_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(TodoItem::from).collect())
    }

    async fn query_items(&self, query: &TodoItemQuery) -> Result<Page<TodoItem>, StoreError> {
        let mut tx = self.tx.lock().await;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM todo_items");
        push_item_filters(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut **tx)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ITEM_COLUMNS} FROM todo_items"));
        push_item_filters(&mut select, query);
        select
            .push(format!(
                " ORDER BY {} {} NULLS LAST, id",
                query.sort.column(),
                query.direction.sql()
            ))
            .push(" LIMIT ")
            .push_bind(query.page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);
        let rows = select
            .build_query_as::<ItemRow>()
            .fetch_all(&mut **tx)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(TodoItem::from).collect(),
            query.page,
            total.max(0) as u64,
        ))
    }
}

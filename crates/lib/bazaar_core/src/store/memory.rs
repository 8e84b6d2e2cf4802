//! In-memory storage backend.
//!
//! Used for local development and tests. A transaction holds the single
//! state lock for its whole lifetime and works on a copy that replaces the
//! shared state on commit, so transactions are serializable. Opening a second
//! transaction from inside an open one on the same task therefore waits
//! forever; use cases never do that.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    ContactKind, Database, RefreshTokenRepository, RoleRepository, StoreError, TodoRepository,
    Transaction, UserRepository,
};
use crate::models::auth::{NewRole, NewUser, RefreshToken, Role, RoleClaim, User};
use crate::models::paging::Page;
use crate::models::todo::{TodoItem, TodoList};
use crate::todos::query::{TodoItemQuery, TodoListQuery};
use crate::uuid::uuidv7;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    /// `(role_id, claim)`
    role_claims: Vec<(Uuid, RoleClaim)>,
    user_roles: HashSet<(Uuid, Uuid)>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    lists: HashMap<Uuid, TodoList>,
    items: HashMap<Uuid, TodoItem>,
}

impl MemoryState {
    fn role_name(&self, role_id: Uuid) -> Option<&str> {
        self.roles.get(&role_id).map(|r| r.name.as_str())
    }
}

/// Shared in-memory database.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<AsyncMutex<MemoryState>>,
    #[cfg(any(test, feature = "testing"))]
    fault: Fault,
}

/// Pending one-shot failure: the operation name and the error it returns.
#[cfg(any(test, feature = "testing"))]
type Fault = Arc<Mutex<Option<(&'static str, StoreError)>>>;

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of the named repository operation fail with
    /// [`StoreError::Injected`]. Test builds only.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next(&self, operation: &'static str) {
        self.fail_next_with(operation, StoreError::Injected(operation));
    }

    /// Like [`MemoryDatabase::fail_next`] with a chosen error.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_with(&self, operation: &'static str, error: StoreError) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = Some((operation, error));
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working: Mutex::new(working),
            #[cfg(any(test, feature = "testing"))]
            fault: self.fault.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Transaction over a private copy of the state.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: Mutex<MemoryState>,
    #[cfg(any(test, feature = "testing"))]
    fault: Fault,
}

impl MemoryTransaction {
    fn run<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut MemoryState) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        #[cfg(any(test, feature = "testing"))]
        {
            let mut fault = self.fault.lock().unwrap_or_else(|e| e.into_inner());
            if fault.as_ref().is_some_and(|(op, _)| *op == operation) {
                if let Some((_, error)) = fault.take() {
                    return Err(error);
                }
            }
        }
        let mut state = self.working.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working.into_inner().unwrap_or_else(|e| e.into_inner());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryTransaction {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.run("find_user_by_id", |s| Ok(s.users.get(&id).cloned()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.run("find_user_by_email", |s| {
            Ok(s.users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned())
        })
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.run("find_user_by_login", |s| {
            Ok(s.users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(login) || u.user_name.eq_ignore_ascii_case(login))
                .cloned())
        })
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.run("create_user", |s| {
            if s.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
                return Err(StoreError::UniqueViolation("email".into()));
            }
            if s
                .users
                .values()
                .any(|u| u.user_name.eq_ignore_ascii_case(&user.user_name))
            {
                return Err(StoreError::UniqueViolation("user name".into()));
            }
            let user = user.into_user(Uuid::new_v4(), Utc::now());
            s.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    async fn user_count(&self) -> Result<u64, StoreError> {
        self.run("user_count", |s| Ok(s.users.len() as u64))
    }

    async fn lock_user_bootstrap(&self) -> Result<(), StoreError> {
        // The state lock already serializes transactions.
        self.run("lock_user_bootstrap", |_| Ok(()))
    }

    async fn record_sign_in(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.run("record_sign_in", |s| {
            let user = s
                .users
                .get_mut(&user_id)
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
            user.last_sign_in_ip = ip.map(str::to_string);
            user.last_sign_in_at = Some(at);
            Ok(())
        })
    }

    async fn find_users_by_contacts(
        &self,
        kind: ContactKind,
        contacts: &[String],
    ) -> Result<Vec<User>, StoreError> {
        let wanted: HashSet<String> = contacts.iter().map(|c| c.trim().to_lowercase()).collect();
        self.run("find_users_by_contacts", |s| {
            let mut users: Vec<User> = s
                .users
                .values()
                .filter(|u| {
                    let contact = match kind {
                        ContactKind::Email => Some(u.email.as_str()),
                        ContactKind::Phone => u.phone_number.as_deref(),
                    };
                    contact.is_some_and(|c| wanted.contains(&c.to_lowercase()))
                })
                .cloned()
                .collect();
            users.sort_by_key(|u| u.created_at);
            Ok(users)
        })
    }
}

#[async_trait]
impl RoleRepository for MemoryTransaction {
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.run("list_roles", |s| {
            let mut roles: Vec<Role> = s.roles.values().cloned().collect();
            roles.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(roles)
        })
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        self.run("find_role_by_name", |s| {
            Ok(s.roles.values().find(|r| r.name == name).cloned())
        })
    }

    async fn upsert_role(&self, role: NewRole) -> Result<Role, StoreError> {
        self.run("upsert_role", |s| {
            if let Some(existing) = s.roles.values_mut().find(|r| r.name == role.name) {
                existing.description = role.description;
                existing.is_system = role.is_system;
                return Ok(existing.clone());
            }
            let created = Role {
                id: uuidv7(),
                name: role.name,
                description: role.description,
                is_system: role.is_system,
                created_at: Utc::now(),
                created_by: None,
            };
            s.roles.insert(created.id, created.clone());
            Ok(created)
        })
    }

    async fn add_role_claim(&self, role_id: Uuid, claim: &RoleClaim) -> Result<(), StoreError> {
        self.run("add_role_claim", |s| {
            if !s.roles.contains_key(&role_id) {
                return Err(StoreError::NotFound(format!("role {role_id}")));
            }
            let exists = s.role_claims.iter().any(|(id, c)| {
                *id == role_id && c.claim_type == claim.claim_type && c.claim_value == claim.claim_value
            });
            if !exists {
                s.role_claims.push((role_id, claim.clone()));
            }
            Ok(())
        })
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        self.run("roles_for_user", |s| {
            let mut roles: Vec<Role> = s
                .user_roles
                .iter()
                .filter(|(uid, _)| *uid == user_id)
                .filter_map(|(_, rid)| s.roles.get(rid).cloned())
                .collect();
            roles.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(roles)
        })
    }

    async fn all_role_claims(&self) -> Result<Vec<RoleClaim>, StoreError> {
        self.run("all_role_claims", |s| {
            Ok(s.role_claims
                .iter()
                .filter_map(|(role_id, claim)| {
                    s.role_name(*role_id).map(|name| RoleClaim {
                        role_name: name.to_string(),
                        claim_type: claim.claim_type,
                        claim_value: claim.claim_value.clone(),
                    })
                })
                .collect())
        })
    }

    async fn set_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> Result<(), StoreError> {
        self.run("set_user_roles", |s| {
            if !s.users.contains_key(&user_id) {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
            if let Some(missing) = role_ids.iter().find(|id| !s.roles.contains_key(id)) {
                return Err(StoreError::NotFound(format!("role {missing}")));
            }
            s.user_roles.retain(|(uid, _)| *uid != user_id);
            s.user_roles
                .extend(role_ids.iter().map(|rid| (user_id, *rid)));
            Ok(())
        })
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryTransaction {
    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.run("insert_refresh_token", |s| {
            if !s.users.contains_key(&token.user_id) {
                return Err(StoreError::NotFound(format!("user {}", token.user_id)));
            }
            if s.refresh_tokens.values().any(|t| t.token_hash == token.token_hash) {
                return Err(StoreError::UniqueViolation("refresh token".into()));
            }
            s.refresh_tokens.insert(token.id, token.clone());
            Ok(())
        })
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        self.run("find_refresh_token_by_hash", |s| {
            Ok(s.refresh_tokens
                .values()
                .find(|t| t.token_hash == token_hash)
                .cloned())
        })
    }

    async fn find_refresh_token_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        self.run("find_refresh_token_by_id", |s| {
            Ok(s.refresh_tokens.get(&id).cloned())
        })
    }

    async fn revoke_refresh_token(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        ip: Option<&str>,
        replaced_by: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        self.run("revoke_refresh_token", |s| {
            match s.refresh_tokens.get_mut(&id) {
                Some(token) if token.revoked_at.is_none() => {
                    token.revoked_at = Some(at);
                    token.revoked_by_ip = ip.map(str::to_string);
                    token.replaced_by_token = replaced_by;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    async fn revoke_user_refresh_tokens(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, StoreError> {
        self.run("revoke_user_refresh_tokens", |s| {
            let mut count = 0;
            for token in s
                .refresh_tokens
                .values_mut()
                .filter(|t| t.user_id == user_id && t.revoked_at.is_none())
            {
                token.revoked_at = Some(at);
                token.revoked_by_ip = ip.map(str::to_string);
                count += 1;
            }
            Ok(count)
        })
    }

    async fn list_user_refresh_tokens(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        self.run("list_user_refresh_tokens", |s| {
            let mut tokens: Vec<RefreshToken> = s
                .refresh_tokens
                .values()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect();
            tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(tokens)
        })
    }

    async fn delete_stale_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.run("delete_stale_refresh_tokens", |s| {
            let before = s.refresh_tokens.len();
            s.refresh_tokens
                .retain(|_, t| t.revoked_at.is_none() && t.expires_at > now);
            Ok((before - s.refresh_tokens.len()) as u64)
        })
    }
}

#[async_trait]
impl TodoRepository for MemoryTransaction {
    async fn insert_list(&self, list: &TodoList) -> Result<(), StoreError> {
        self.run("insert_list", |s| {
            s.lists.insert(list.id, list.clone());
            Ok(())
        })
    }

    async fn find_list(&self, id: Uuid) -> Result<Option<TodoList>, StoreError> {
        self.run("find_list", |s| Ok(s.lists.get(&id).cloned()))
    }

    async fn update_list(&self, list: &TodoList) -> Result<(), StoreError> {
        self.run("update_list", |s| match s.lists.get_mut(&list.id) {
            Some(existing) => {
                *existing = list.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("todo list {}", list.id))),
        })
    }

    async fn delete_list(&self, id: Uuid) -> Result<(), StoreError> {
        self.run("delete_list", |s| {
            s.lists
                .remove(&id)
                .ok_or_else(|| StoreError::NotFound(format!("todo list {id}")))?;
            s.items.retain(|_, item| item.list_id != id);
            Ok(())
        })
    }

    async fn query_lists(&self, query: &TodoListQuery) -> Result<Page<TodoList>, StoreError> {
        self.run("query_lists", |s| {
            let mut lists: Vec<TodoList> =
                s.lists.values().filter(|l| query.matches(l)).cloned().collect();
            lists.sort_by(|a, b| query.compare(a, b));
            Ok(Page::from_vec(lists, query.page))
        })
    }

    async fn insert_item(&self, item: &TodoItem) -> Result<(), StoreError> {
        self.run("insert_item", |s| {
            if !s.lists.contains_key(&item.list_id) {
                return Err(StoreError::NotFound(format!("todo list {}", item.list_id)));
            }
            s.items.insert(item.id, item.clone());
            Ok(())
        })
    }

    async fn find_item(&self, id: Uuid) -> Result<Option<TodoItem>, StoreError> {
        self.run("find_item", |s| Ok(s.items.get(&id).cloned()))
    }

    async fn update_item(&self, item: &TodoItem) -> Result<(), StoreError> {
        self.run("update_item", |s| match s.items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("todo item {}", item.id))),
        })
    }

    async fn delete_item(&self, id: Uuid) -> Result<(), StoreError> {
        self.run("delete_item", |s| {
            s.items
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("todo item {id}")))
        })
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<TodoItem>, StoreError> {
        self.run("items_for_list", |s| {
            let mut items: Vec<TodoItem> = s
                .items
                .values()
                .filter(|i| i.list_id == list_id)
                .cloned()
                .collect();
            items.sort_by(|a, b| a.audit.created_at.cmp(&b.audit.created_at).then(a.id.cmp(&b.id)));
            Ok(items)
        })
    }

    async fn query_items(&self, query: &TodoItemQuery) -> Result<Page<TodoItem>, StoreError> {
        self.run("query_items", |s| {
            let mut items: Vec<TodoItem> =
                s.items.values().filter(|i| query.matches(i)).cloned().collect();
            items.sort_by(|a, b| query.compare(a, b));
            Ok(Page::from_vec(items, query.page))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            user_name: name.into(),
            email: format!("{name}@example.com"),
            phone_number: Some("+15550100".into()),
            password_hash: None,
        }
    }

    #[tokio::test]
    async fn committed_changes_are_visible() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();
        let user = tx.create_user(new_user("ada")).await.unwrap();
        tx.commit().await.unwrap();

        let tx = db.begin().await.unwrap();
        assert_eq!(tx.find_user_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn rolled_back_changes_are_discarded() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();
        tx.create_user(new_user("ada")).await.unwrap();
        tx.rollback().await.unwrap();

        let tx = db.begin().await.unwrap();
        assert_eq!(tx.user_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_is_unique_violation() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();
        tx.create_user(new_user("ada")).await.unwrap();
        let mut dup = new_user("other");
        dup.email = "ADA@example.com".into();
        assert!(matches!(
            tx.create_user(dup).await,
            Err(StoreError::UniqueViolation(_))
        ));
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let db = MemoryDatabase::new();
        db.fail_next("user_count");
        let tx = db.begin().await.unwrap();
        assert!(matches!(
            tx.user_count().await,
            Err(StoreError::Injected("user_count"))
        ));
        assert_eq!(tx.user_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn injected_fault_can_carry_a_chosen_error() {
        let db = MemoryDatabase::new();
        db.fail_next_with("user_count", StoreError::Conflict("serialization".into()));
        let tx = db.begin().await.unwrap();
        assert!(matches!(tx.user_count().await, Err(StoreError::Conflict(_))));
        assert!(tx.lock_user_bootstrap().await.is_ok());
    }

    #[tokio::test]
    async fn contacts_match_case_insensitively() {
        let db = MemoryDatabase::new();
        let tx = db.begin().await.unwrap();
        tx.create_user(new_user("ada")).await.unwrap();
        tx.create_user(new_user("bob")).await.unwrap();
        let found = tx
            .find_users_by_contacts(ContactKind::Email, &["  ADA@Example.COM".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_name, "ada");
    }
}

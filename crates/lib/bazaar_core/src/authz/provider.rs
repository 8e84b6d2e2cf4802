//! Cached resolution of a user's roles, permissions and policies.
//!
//! Cache-aside over a [`DistributedCache`]: a hit returns immediately; a miss
//! takes the per-user [`KeyedLock`], re-checks the cache and only then
//! recomputes from the store. Cache faults are logged and treated as misses.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheEntryOptions, DistributedCache, get_json, set_json};
use crate::lock::KeyedLock;
use crate::models::auth::{ClaimType, Role, RoleClaim, User, UserAuthorizationData};
use crate::store::{Database, StoreError};

pub const ROLE_CLAIMS_KEY: &str = "AllRoleClaims";

pub fn user_cache_key(user_id: Uuid) -> String {
    format!("UserAuth_{user_id}")
}

/// The reads the provider needs from the source of truth.
#[async_trait]
pub trait AuthorizationSource: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError>;
    async fn role_claims(&self) -> Result<Vec<RoleClaim>, StoreError>;
}

/// [`AuthorizationSource`] reading through short read-only transactions.
pub struct StoreAuthorizationSource(pub Arc<dyn Database>);

#[async_trait]
impl AuthorizationSource for StoreAuthorizationSource {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let tx = self.0.begin().await?;
        let user = tx.find_user_by_id(user_id).await;
        tx.rollback().await?;
        user
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let tx = self.0.begin().await?;
        let roles = tx.roles_for_user(user_id).await;
        tx.rollback().await?;
        roles
    }

    async fn role_claims(&self) -> Result<Vec<RoleClaim>, StoreError> {
        let tx = self.0.begin().await?;
        let claims = tx.all_role_claims().await;
        tx.rollback().await?;
        claims
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationCacheSettings {
    /// Hard lifetime of a user entry.
    pub absolute_ttl: Duration,
    /// Idle window of a user entry.
    pub sliding_ttl: Duration,
    /// Lifetime of the shared role-claims entry.
    pub role_claims_ttl: Duration,
}

impl Default for AuthorizationCacheSettings {
    fn default() -> Self {
        Self {
            absolute_ttl: Duration::from_secs(3600),
            sliding_ttl: Duration::from_secs(900),
            role_claims_ttl: Duration::from_secs(3600),
        }
    }
}

pub struct AuthorizationDataProvider {
    source: Arc<dyn AuthorizationSource>,
    cache: Arc<dyn DistributedCache>,
    locks: KeyedLock,
    settings: AuthorizationCacheSettings,
}

impl AuthorizationDataProvider {
    pub fn new(
        source: Arc<dyn AuthorizationSource>,
        cache: Arc<dyn DistributedCache>,
        settings: AuthorizationCacheSettings,
    ) -> Self {
        Self {
            source,
            cache,
            locks: KeyedLock::new(),
            settings,
        }
    }

    /// Authorization data for `user_id`, or `None` if the user does not exist.
    pub async fn get_user_authorization(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserAuthorizationData>, StoreError> {
        let key = user_cache_key(user_id);
        if let Some(hit) = self.cached::<UserAuthorizationData>(&key).await {
            return Ok(Some(hit));
        }

        let _guard = self.locks.lock(&key).await;
        if let Some(hit) = self.cached::<UserAuthorizationData>(&key).await {
            return Ok(Some(hit));
        }

        let Some(data) = self.compute(user_id).await? else {
            return Ok(None);
        };
        let options = CacheEntryOptions::absolute(self.settings.absolute_ttl)
            .with_sliding(self.settings.sliding_ttl);
        self.store(&key, &data, options).await;
        Ok(Some(data))
    }

    /// Best-effort eviction of one user's entry.
    pub async fn invalidate_user_authorization(&self, user_id: Uuid) {
        let key = user_cache_key(user_id);
        if let Err(e) = self.cache.remove(&key).await {
            warn!(%key, error = %e, "Failed to invalidate authorization cache entry");
        }
    }

    /// Best-effort eviction of the shared role-claims entry.
    pub async fn invalidate_role_claims(&self) {
        if let Err(e) = self.cache.remove(ROLE_CLAIMS_KEY).await {
            warn!(key = ROLE_CLAIMS_KEY, error = %e, "Failed to invalidate role claims cache entry");
        }
    }

    async fn compute(&self, user_id: Uuid) -> Result<Option<UserAuthorizationData>, StoreError> {
        let Some(user) = self.source.find_user(user_id).await? else {
            debug!(%user_id, "No authorization data: user not found");
            return Ok(None);
        };
        let mut roles: Vec<String> = self
            .source
            .user_roles(user_id)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        roles.sort();
        roles.dedup();

        let claims_by_role = self.role_claims_by_role().await?;
        let mut permissions = BTreeSet::new();
        let mut policies = BTreeSet::new();
        for claim in roles
            .iter()
            .filter_map(|r| claims_by_role.get(r))
            .flatten()
        {
            match claim.claim_type {
                ClaimType::Permission => permissions.insert(claim.claim_value.clone()),
                ClaimType::Policy => policies.insert(claim.claim_value.clone()),
            };
        }

        debug!(%user_id, roles = roles.len(), permissions = permissions.len(), "Computed authorization data");
        Ok(Some(UserAuthorizationData {
            user_id: user.id,
            user_name: user.user_name,
            email: user.email,
            permissions: permissions.into_iter().collect(),
            roles,
            policies: policies.into_iter().collect(),
        }))
    }

    async fn role_claims_by_role(&self) -> Result<HashMap<String, Vec<RoleClaim>>, StoreError> {
        if let Some(hit) = self.cached(ROLE_CLAIMS_KEY).await {
            return Ok(hit);
        }
        let mut by_role: HashMap<String, Vec<RoleClaim>> = HashMap::new();
        for claim in self.source.role_claims().await? {
            by_role.entry(claim.role_name.clone()).or_default().push(claim);
        }
        self.store(
            ROLE_CLAIMS_KEY,
            &by_role,
            CacheEntryOptions::absolute(self.settings.role_claims_ttl),
        )
        .await;
        Ok(by_role)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match get_json(self.cache.as_ref(), key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(%key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: CacheEntryOptions) {
        if let Err(e) = set_json(self.cache.as_ref(), key, value, options).await {
            warn!(%key, error = %e, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::cache::memory::MemoryCache;
    use crate::models::auth::NewUser;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that counts and delays user lookups.
    struct CountingSource {
        users: HashMap<Uuid, (User, Vec<Role>)>,
        claims: Vec<RoleClaim>,
        delay: Duration,
        lookups: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self {
                users: HashMap::new(),
                claims: vec![
                    claim("Admin", ClaimType::Permission, "todo.lists.read"),
                    claim("Admin", ClaimType::Permission, "users.roles.manage"),
                    claim("Admin", ClaimType::Policy, "UserManagement"),
                    claim("User", ClaimType::Permission, "todo.lists.read"),
                    claim("Guest", ClaimType::Permission, "guest.only"),
                ],
                delay,
                lookups: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_user(mut self, name: &str, roles: &[&str]) -> (Self, Uuid) {
            let user = NewUser {
                user_name: name.into(),
                email: format!("{name}@example.com"),
                phone_number: None,
                password_hash: None,
            }
            .into_user(Uuid::new_v4(), Utc::now());
            let id = user.id;
            let roles = roles.iter().map(|r| role(r)).collect();
            self.users.insert(id, (user, roles));
            (self, id)
        }
    }

    fn claim(role: &str, claim_type: ClaimType, value: &str) -> RoleClaim {
        RoleClaim {
            role_name: role.into(),
            claim_type,
            claim_value: value.into(),
        }
    }

    fn role(name: &str) -> Role {
        Role {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            is_system: false,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[async_trait]
    impl AuthorizationSource for CountingSource {
        async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.users.get(&user_id).map(|(u, _)| u.clone()))
        }

        async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
            Ok(self
                .users
                .get(&user_id)
                .map(|(_, r)| r.clone())
                .unwrap_or_default())
        }

        async fn role_claims(&self) -> Result<Vec<RoleClaim>, StoreError> {
            Ok(self.claims.clone())
        }
    }

    /// Cache whose every call fails.
    struct BrokenCache;

    fn broken() -> CacheError {
        CacheError::Serialization(serde_json::from_str::<u8>("x").unwrap_err())
    }

    #[async_trait]
    impl DistributedCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(broken())
        }
        async fn set(&self, _: &str, _: String, _: CacheEntryOptions) -> Result<(), CacheError> {
            Err(broken())
        }
        async fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Err(broken())
        }
    }

    fn provider(
        source: Arc<CountingSource>,
        cache: Arc<dyn DistributedCache>,
    ) -> AuthorizationDataProvider {
        AuthorizationDataProvider::new(source, cache, AuthorizationCacheSettings::default())
    }

    #[tokio::test]
    async fn partitions_distinct_claims_of_held_roles() {
        let (source, id) = CountingSource::new(Duration::ZERO).with_user("ada", &["User", "Admin"]);
        let p = provider(Arc::new(source), Arc::new(MemoryCache::new()));
        let data = p.get_user_authorization(id).await.unwrap().unwrap();
        assert_eq!(data.roles, vec!["Admin", "User"]);
        assert_eq!(data.permissions, vec!["todo.lists.read", "users.roles.manage"]);
        assert_eq!(data.policies, vec!["UserManagement"]);
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let cache = Arc::new(MemoryCache::new());
        let p = provider(source, cache.clone());
        assert_eq!(p.get_user_authorization(Uuid::new_v4()).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_cold_reads_recompute_once() {
        let (source, id) = CountingSource::new(Duration::from_millis(50)).with_user("ada", &["User"]);
        let source = Arc::new(source);
        let p = Arc::new(provider(source.clone(), Arc::new(MemoryCache::new())));

        let results = futures::future::join_all(
            (0..16).map(|_| {
                let p = p.clone();
                tokio::spawn(async move { p.get_user_authorization(id).await })
            }),
        )
        .await;

        for r in results {
            let data = r.unwrap().unwrap().unwrap();
            assert_eq!(data.user_id, id);
        }
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_users_resolve_in_parallel() {
        let (source, a) = CountingSource::new(Duration::from_millis(50)).with_user("ada", &["User"]);
        let (source, b) = source.with_user("bob", &["User"]);
        let source = Arc::new(source);
        let p = Arc::new(provider(source.clone(), Arc::new(MemoryCache::new())));

        let (ra, rb) = tokio::join!(p.get_user_authorization(a), p.get_user_authorization(b));
        assert!(ra.unwrap().is_some());
        assert!(rb.unwrap().is_some());
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_faults_fall_back_to_store() {
        let (source, id) = CountingSource::new(Duration::ZERO).with_user("ada", &["Admin"]);
        let source = Arc::new(source);
        let p = provider(source.clone(), Arc::new(BrokenCache));

        assert!(p.get_user_authorization(id).await.unwrap().is_some());
        assert!(p.get_user_authorization(id).await.unwrap().is_some());
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
        // must not panic or surface the error
        p.invalidate_user_authorization(id).await;
        p.invalidate_role_claims().await;
    }

    #[tokio::test]
    async fn invalidation_forces_recompute() {
        let (source, id) = CountingSource::new(Duration::ZERO).with_user("ada", &["User"]);
        let source = Arc::new(source);
        let p = provider(source.clone(), Arc::new(MemoryCache::new()));

        p.get_user_authorization(id).await.unwrap();
        p.get_user_authorization(id).await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);

        p.invalidate_user_authorization(id).await;
        p.get_user_authorization(id).await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }
}

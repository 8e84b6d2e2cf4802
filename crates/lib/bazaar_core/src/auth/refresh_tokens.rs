//! Opaque, persisted refresh tokens with rotation and reuse detection.
//!
//! Only the SHA-256 hex digest of a token is stored. Rotating a token revokes
//! it, links it to its successor and inserts the successor in one
//! transaction. Presenting a token that was already rotated revokes the
//! whole chain that descends from it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::auth::{RefreshToken, TokenState, User};
use crate::store::uow::UnitOfWork;
use crate::store::{Database, Transaction};
use crate::uuid::uuidv7;

pub const DEFAULT_LIFETIME_DAYS: i64 = 7;

const TOKEN_LEN: usize = 64;

/// Generate a random token (64 alphanumeric chars).
fn generate_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A freshly issued token. `token` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshToken,
}

/// Outcome of a successful rotation.
#[derive(Debug, Clone)]
pub struct RotatedRefreshToken {
    pub user: User,
    pub issued: IssuedRefreshToken,
}

/// A refresh token as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by_ip: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub state: TokenState,
}

fn invalid_token() -> DomainError {
    DomainError::unauthorized("auth.invalid_refresh_token", "Refresh token is invalid")
}

pub struct RefreshTokenService {
    db: Arc<dyn Database>,
    lifetime: Duration,
}

impl RefreshTokenService {
    pub fn new(db: Arc<dyn Database>, lifetime: Duration) -> Self {
        Self { db, lifetime }
    }

    fn mint(&self, user_id: Uuid, ip: Option<&str>) -> IssuedRefreshToken {
        let token = generate_token();
        let now = Utc::now();
        let record = RefreshToken {
            id: uuidv7(),
            user_id,
            token_hash: hash_token(&token),
            created_at: now,
            created_by_ip: ip.map(str::to_string),
            expires_at: now + self.lifetime,
            revoked_at: None,
            revoked_by_ip: None,
            replaced_by_token: None,
        };
        IssuedRefreshToken { token, record }
    }

    /// Create and persist a new token inside the caller's transaction.
    pub async fn issue(
        &self,
        tx: &dyn Transaction,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<IssuedRefreshToken, DomainError> {
        let issued = self.mint(user_id, ip);
        tx.insert_refresh_token(&issued.record).await?;
        debug!(%user_id, token_id = %issued.record.id, "Issued refresh token");
        Ok(issued)
    }

    /// Exchange `presented` for a new token.
    pub async fn rotate(
        &self,
        presented: &str,
        ip: Option<&str>,
    ) -> Result<RotatedRefreshToken, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;

        let Some(current) = scope.find_refresh_token_by_hash(&hash_token(presented)).await? else {
            scope.rollback().await?;
            return Err(invalid_token());
        };

        let now = Utc::now();
        match current.state(now) {
            TokenState::Active => {}
            TokenState::Revoked if current.replaced_by_token.is_some() => {
                let revoked = self.revoke_descendants(&*scope, &current, now, ip).await;
                let revoked = scope.complete(revoked).await?;
                warn!(
                    user_id = %current.user_id,
                    token_id = %current.id,
                    revoked,
                    "Rotated refresh token presented again; revoked its descendants"
                );
                return Err(DomainError::unauthorized(
                    "auth.refresh_token_reused",
                    "Refresh token has already been used",
                ));
            }
            TokenState::Revoked => {
                scope.rollback().await?;
                return Err(invalid_token());
            }
            TokenState::Expired => {
                scope.rollback().await?;
                return Err(DomainError::unauthorized(
                    "auth.refresh_token_expired",
                    "Refresh token has expired",
                ));
            }
        }

        let outcome = self.replace(&*scope, &current, now, ip).await;
        let rotated = scope.complete(outcome).await?;
        info!(user_id = %rotated.user.id, token_id = %rotated.issued.record.id, "Rotated refresh token");
        Ok(rotated)
    }

    async fn replace(
        &self,
        tx: &dyn Transaction,
        current: &RefreshToken,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<RotatedRefreshToken, DomainError> {
        let user = tx
            .find_user_by_id(current.user_id)
            .await?
            .ok_or_else(invalid_token)?;
        let issued = self.mint(user.id, ip);
        if !tx
            .revoke_refresh_token(current.id, now, ip, Some(issued.record.id))
            .await?
        {
            // Lost a race with a concurrent rotation of the same token.
            return Err(DomainError::conflict(
                "auth.refresh_token_rotated",
                "Refresh token was rotated concurrently",
            ));
        }
        tx.insert_refresh_token(&issued.record).await?;
        Ok(RotatedRefreshToken { user, issued })
    }

    /// Walk `replaced_by_token` links from `start`, revoking active tokens.
    async fn revoke_descendants(
        &self,
        tx: &dyn Transaction,
        start: &RefreshToken,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<u64, DomainError> {
        let mut seen = HashSet::from([start.id]);
        let mut next = start.replaced_by_token;
        let mut revoked = 0;
        while let Some(id) = next {
            if !seen.insert(id) {
                break;
            }
            let Some(token) = tx.find_refresh_token_by_id(id).await? else {
                break;
            };
            if token.is_active(now) && tx.revoke_refresh_token(token.id, now, ip, None).await? {
                revoked += 1;
            }
            next = token.replaced_by_token;
        }
        Ok(revoked)
    }

    /// Revoke one token. Unknown or already revoked tokens are not an error.
    /// Returns the owning user when a token was revoked.
    pub async fn revoke(&self, presented: &str, ip: Option<&str>) -> Result<Option<Uuid>, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome: Result<Option<Uuid>, DomainError> = async {
            let Some(token) = scope.find_refresh_token_by_hash(&hash_token(presented)).await? else {
                return Ok(None);
            };
            let revoked = scope
                .revoke_refresh_token(token.id, Utc::now(), ip, None)
                .await?;
            Ok(revoked.then_some(token.user_id))
        }
        .await;
        scope.complete(outcome).await
    }

    /// Revoke every active token of a user. Returns how many were revoked.
    pub async fn revoke_all(&self, user_id: Uuid, ip: Option<&str>) -> Result<u64, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = scope
            .revoke_user_refresh_tokens(user_id, Utc::now(), ip)
            .await
            .map_err(DomainError::from);
        let count = scope.complete(outcome).await?;
        info!(%user_id, count, "Revoked all refresh tokens");
        Ok(count)
    }

    pub async fn sessions(&self, user_id: Uuid) -> Result<Vec<RefreshTokenSession>, DomainError> {
        let tx = self.db.begin().await?;
        let tokens = tx.list_user_refresh_tokens(user_id).await;
        tx.rollback().await?;
        let now = Utc::now();
        Ok(tokens?
            .into_iter()
            .map(|t| RefreshTokenSession {
                id: t.id,
                created_at: t.created_at,
                state: t.state(now),
                created_by_ip: t.created_by_ip,
                expires_at: t.expires_at,
                revoked_at: t.revoked_at,
            })
            .collect())
    }

    /// Delete tokens that are revoked or expired.
    pub async fn delete_stale(&self) -> Result<u64, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = scope
            .delete_stale_refresh_tokens(Utc::now())
            .await
            .map_err(DomainError::from);
        scope.complete(outcome).await
    }
}

//! Account use cases: registration, sign-in, token refresh, sign-out and
//! role assignment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::external::{ExternalAuthVerifier, ExternalProvider};
use super::jwt::{JwtService, TokenKind, TokenSubject};
use super::password::{MIN_PASSWORD_LEN, hash_password, verify_password_or_dummy};
use super::refresh_tokens::{IssuedRefreshToken, RefreshTokenService, RefreshTokenSession};
use super::AuthError;
use crate::authz::permissions::{ROLE_ADMIN, ROLE_USER};
use crate::authz::AuthorizationDataProvider;
use crate::error::{DomainError, Validator};
use crate::models::auth::{NewUser, Role, User, UserAuthorizationData};
use crate::store::uow::UnitOfWork;
use crate::store::{Database, StoreError, Transaction};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCommand {
    pub email: String,
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
}

impl From<&User> for AccountSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            user_name: u.user_name.clone(),
            email: u.email.clone(),
        }
    }
}

/// Access token plus the plaintext refresh token, returned once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub user: AccountSummary,
}

fn invalid_credentials() -> DomainError {
    DomainError::unauthorized("auth.invalid_credentials", "Invalid credentials")
}

pub struct AccountService {
    db: Arc<dyn Database>,
    jwt: Arc<JwtService>,
    refresh_tokens: Arc<RefreshTokenService>,
    authz: Arc<AuthorizationDataProvider>,
    external: Arc<dyn ExternalAuthVerifier>,
}

impl AccountService {
    pub fn new(
        db: Arc<dyn Database>,
        jwt: Arc<JwtService>,
        refresh_tokens: Arc<RefreshTokenService>,
        authz: Arc<AuthorizationDataProvider>,
        external: Arc<dyn ExternalAuthVerifier>,
    ) -> Self {
        Self {
            db,
            jwt,
            refresh_tokens,
            authz,
            external,
        }
    }

    pub async fn register(
        &self,
        cmd: RegisterCommand,
        ip: Option<&str>,
    ) -> Result<AuthTokens, DomainError> {
        let email = cmd.email.trim().to_string();
        let user_name = cmd.user_name.trim().to_string();
        Validator::new()
            .check(email.contains('@'), "auth.email_invalid", "A valid email address is required")
            .check(!user_name.is_empty(), "auth.user_name_required", "User name is required")
            .check(
                cmd.password.chars().count() >= MIN_PASSWORD_LEN,
                "auth.password_too_short",
                "Password must be at least 8 characters",
            )
            .finish()?;
        let password_hash = hash_password(&cmd.password)?;

        let new_user = NewUser {
            user_name,
            email,
            phone_number: cmd.phone_number.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            password_hash: Some(password_hash),
        };
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = self.create_account(&*scope, new_user, ip).await;
        let (user, refresh) = scope.complete(outcome).await?;
        info!(user_id = %user.id, "Registered user");
        self.tokens(&user, refresh).await
    }

    /// Sign in with an email or user name.
    pub async fn login_with_password(
        &self,
        login: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<AuthTokens, DomainError> {
        let user = {
            let tx = self.db.begin().await?;
            let user = tx.find_user_by_login(login.trim()).await;
            tx.rollback().await?;
            user?
        };
        let hash = user.as_ref().and_then(|u| u.password_hash.as_deref());
        let verified = verify_password_or_dummy(password, hash);
        let Some(user) = user.filter(|_| verified) else {
            warn!("Failed password sign-in");
            return Err(invalid_credentials());
        };

        let refresh = self.sign_in(&user, ip).await?;
        self.tokens(&user, refresh).await
    }

    /// Sign in with a provider token, creating the account on first use.
    pub async fn external_login(
        &self,
        provider: ExternalProvider,
        access_token: &str,
        ip: Option<&str>,
    ) -> Result<AuthTokens, DomainError> {
        let identity = self.external.verify(provider, access_token).await?;

        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome: Result<(User, IssuedRefreshToken), DomainError> = async {
            match scope.find_user_by_email(&identity.email).await? {
                Some(user) => {
                    scope.record_sign_in(user.id, ip, Utc::now()).await?;
                    let refresh = self.refresh_tokens.issue(&*scope, user.id, ip).await?;
                    Ok((user, refresh))
                }
                None => {
                    let new_user = NewUser {
                        user_name: identity.email.clone(),
                        email: identity.email.clone(),
                        phone_number: None,
                        password_hash: None,
                    };
                    self.create_account(&*scope, new_user, ip).await
                }
            }
        }
        .await;
        let (user, refresh) = scope.complete(outcome).await?;
        info!(user_id = %user.id, provider = provider.as_str(), "External sign-in");
        self.tokens(&user, refresh).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str, ip: Option<&str>) -> Result<AuthTokens, DomainError> {
        let rotated = self.refresh_tokens.rotate(refresh_token, ip).await?;
        self.tokens(&rotated.user, rotated.issued).await
    }

    /// Returns whether a token was revoked.
    pub async fn logout(&self, refresh_token: &str, ip: Option<&str>) -> Result<bool, DomainError> {
        Ok(self.refresh_tokens.revoke(refresh_token, ip).await?.is_some())
    }

    pub async fn logout_all(&self, user_id: Uuid, ip: Option<&str>) -> Result<u64, DomainError> {
        self.refresh_tokens.revoke_all(user_id, ip).await
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserAuthorizationData, DomainError> {
        self.authz
            .get_user_authorization(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("auth.user_not_found", "User not found"))
    }

    pub async fn sessions(&self, user_id: Uuid) -> Result<Vec<RefreshTokenSession>, DomainError> {
        self.refresh_tokens.sessions(user_id).await
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, DomainError> {
        let tx = self.db.begin().await?;
        let roles = tx.list_roles().await;
        tx.rollback().await?;
        Ok(roles?)
    }

    /// Replace a user's roles. Returns the assigned role names.
    pub async fn set_user_roles(
        &self,
        user_id: Uuid,
        role_names: &[String],
    ) -> Result<Vec<String>, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome = async {
            scope
                .find_user_by_id(user_id)
                .await?
                .ok_or_else(|| DomainError::not_found("user.not_found", format!("User {user_id} not found")))?;
            let mut roles = Vec::with_capacity(role_names.len());
            for name in role_names {
                let role = scope.find_role_by_name(name.trim()).await?.ok_or_else(|| {
                    DomainError::not_found("role.not_found", format!("Role \"{name}\" not found"))
                })?;
                if !roles.iter().any(|r: &Role| r.id == role.id) {
                    roles.push(role);
                }
            }
            let ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
            scope.set_user_roles(user_id, &ids).await?;
            Ok::<_, DomainError>(roles)
        }
        .await;
        let roles = scope.complete(outcome).await?;
        self.authz.invalidate_user_authorization(user_id).await;

        let mut names: Vec<String> = roles.into_iter().map(|r| r.name).collect();
        names.sort();
        info!(%user_id, roles = ?names, "Replaced user roles");
        Ok(names)
    }

    /// Insert a user, grant the default role and issue a refresh token.
    /// The first account ever created becomes an administrator.
    async fn create_account(
        &self,
        tx: &dyn Transaction,
        new_user: NewUser,
        ip: Option<&str>,
    ) -> Result<(User, IssuedRefreshToken), DomainError> {
        tx.lock_user_bootstrap().await?;
        let first = tx.user_count().await? == 0;
        let user = tx.create_user(new_user).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => DomainError::conflict(
                "auth.account_exists",
                "An account with this email or user name already exists",
            ),
            other => other.into(),
        })?;
        let role_name = if first { ROLE_ADMIN } else { ROLE_USER };
        let role = tx
            .find_role_by_name(role_name)
            .await?
            .ok_or_else(|| DomainError::Unexpected(format!("default role {role_name} is missing")))?;
        tx.set_user_roles(user.id, &[role.id]).await?;
        tx.record_sign_in(user.id, ip, Utc::now()).await?;
        let refresh = self.refresh_tokens.issue(tx, user.id, ip).await?;
        Ok((user, refresh))
    }

    async fn sign_in(&self, user: &User, ip: Option<&str>) -> Result<IssuedRefreshToken, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let scope = uow.begin().await?;
        let outcome: Result<IssuedRefreshToken, DomainError> = async {
            scope.record_sign_in(user.id, ip, Utc::now()).await?;
            self.refresh_tokens.issue(&*scope, user.id, ip).await
        }
        .await;
        scope.complete(outcome).await
    }

    async fn tokens(&self, user: &User, refresh: IssuedRefreshToken) -> Result<AuthTokens, DomainError> {
        let data = self.me(user.id).await?;
        let is_system = {
            let tx = self.db.begin().await?;
            let roles = tx.roles_for_user(user.id).await;
            tx.rollback().await?;
            roles?.iter().any(|r| r.is_system)
        };
        let access = self
            .jwt
            .issue(
                &TokenSubject {
                    user_id: user.id,
                    email: user.email.clone(),
                    user_name: user.user_name.clone(),
                    roles: data.roles,
                    permissions: data.permissions,
                    is_system,
                },
                TokenKind::Access,
            )
            .map_err(AuthError::from)?;
        Ok(AuthTokens {
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.record.expires_at,
            user: user.into(),
        })
    }
}

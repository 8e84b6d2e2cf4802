//! Deletes revoked and expired refresh tokens.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{JobError, ScheduledJob};
use crate::auth::refresh_tokens::RefreshTokenService;
use crate::error::DomainError;

pub struct RefreshTokenCleanupJob {
    tokens: Arc<RefreshTokenService>,
}

impl RefreshTokenCleanupJob {
    pub fn new(tokens: Arc<RefreshTokenService>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl ScheduledJob for RefreshTokenCleanupJob {
    fn name(&self) -> &'static str {
        "refresh_token_cleanup"
    }

    async fn run(&self) -> Result<(), JobError> {
        match self.tokens.delete_stale().await {
            Ok(0) => Ok(()),
            Ok(deleted) => {
                info!(deleted, "Deleted stale refresh tokens");
                Ok(())
            }
            Err(DomainError::Conflict(detail)) => Err(JobError::Conflict(detail.description)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::auth::NewUser;
    use crate::store::{Database, StoreError};
    use crate::store::memory::MemoryDatabase;
    use uuid::Uuid;

    /// One user holding one revoked token.
    async fn revoked_token() -> (MemoryDatabase, Arc<RefreshTokenService>, Uuid) {
        let db = MemoryDatabase::new();
        let tokens = Arc::new(RefreshTokenService::new(Arc::new(db.clone()), Duration::days(7)));
        let tx = db.begin().await.unwrap();
        let user = tx
            .create_user(NewUser {
                user_name: "ada".into(),
                email: "ada@example.com".into(),
                phone_number: None,
                password_hash: None,
            })
            .await
            .unwrap();
        let issued = tokens.issue(tx.as_ref(), user.id, None).await.unwrap();
        tx.commit().await.unwrap();
        tokens.revoke(&issued.token, None).await.unwrap();
        (db, tokens, user.id)
    }

    #[tokio::test]
    async fn removes_revoked_tokens_and_maps_faults() {
        let (db, tokens, user_id) = revoked_token().await;

        let job = RefreshTokenCleanupJob::new(tokens.clone());
        job.run().await.unwrap();
        assert!(tokens.sessions(user_id).await.unwrap().is_empty());

        db.fail_next("delete_stale_refresh_tokens");
        assert!(matches!(job.run().await, Err(JobError::Failed(_))));
    }

    #[tokio::test]
    async fn conflict_rolls_back_and_is_retried() {
        let (db, tokens, user_id) = revoked_token().await;

        let job = RefreshTokenCleanupJob::new(tokens.clone());
        db.fail_next_with(
            "delete_stale_refresh_tokens",
            StoreError::Conflict("could not serialize access".into()),
        );
        assert!(matches!(job.run().await, Err(JobError::Conflict(_))));
        assert_eq!(tokens.sessions(user_id).await.unwrap().len(), 1);

        job.run().await.unwrap();
        assert!(tokens.sessions(user_id).await.unwrap().is_empty());
    }
}

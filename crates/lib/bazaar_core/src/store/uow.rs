//! Unit-of-Work: at most one open transaction per use-case invocation.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use super::{Database, StoreError, Transaction};

/// Wraps a [`Database`] for the duration of one operation.
///
/// Create one per request or job run. A second [`UnitOfWork::begin`] while a
/// scope is still alive fails with [`StoreError::NestedTransaction`] instead
/// of waiting.
pub struct UnitOfWork {
    db: Arc<dyn Database>,
    slot: Arc<Semaphore>,
}

impl UnitOfWork {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn begin(&self) -> Result<UnitOfWorkScope, StoreError> {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| StoreError::NestedTransaction)?;
        let tx = self.db.begin().await?;
        Ok(UnitOfWorkScope {
            tx,
            _permit: permit,
        })
    }
}

/// An open transaction. Dropping it without committing rolls back.
pub struct UnitOfWorkScope {
    tx: Box<dyn Transaction>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for UnitOfWorkScope {
    type Target = dyn Transaction;

    fn deref(&self) -> &Self::Target {
        self.tx.as_ref()
    }
}

impl UnitOfWorkScope {
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// A failed commit replaces the outcome. A failed rollback is logged and
    /// the original error is returned.
    pub async fn complete<T, E>(self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::models::auth::NewUser;
    use crate::store::memory::MemoryDatabase;

    fn uow(db: &MemoryDatabase) -> UnitOfWork {
        UnitOfWork::new(Arc::new(db.clone()))
    }

    fn new_user() -> NewUser {
        NewUser {
            user_name: "ada".into(),
            email: "ada@example.com".into(),
            phone_number: None,
            password_hash: None,
        }
    }

    #[tokio::test]
    async fn nested_begin_is_rejected() {
        let db = MemoryDatabase::new();
        let uow = uow(&db);
        let scope = uow.begin().await.unwrap();
        assert!(matches!(
            uow.begin().await,
            Err(StoreError::NestedTransaction)
        ));
        scope.rollback().await.unwrap();
        // slot is free again once the scope is gone
        uow.begin().await.unwrap().commit().await.unwrap();
    }

    #[tokio::test]
    async fn complete_commits_success() {
        let db = MemoryDatabase::new();
        let uow = uow(&db);
        let scope = uow.begin().await.unwrap();
        let outcome: Result<_, DomainError> = scope.create_user(new_user()).await.map_err(Into::into);
        scope.complete(outcome).await.unwrap();

        let tx = db.begin().await.unwrap();
        assert_eq!(tx.user_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn complete_rolls_back_failure() {
        let db = MemoryDatabase::new();
        let uow = uow(&db);
        let scope = uow.begin().await.unwrap();
        scope.create_user(new_user()).await.unwrap();
        let outcome: Result<(), DomainError> =
            Err(DomainError::validation("test.failed", "later step failed"));
        assert!(scope.complete(outcome).await.is_err());

        let tx = db.begin().await.unwrap();
        assert_eq!(tx.user_count().await.unwrap(), 0);
    }
}

//! Distributed cache abstraction.
//!
//! Values are strings; [`get_json`] and [`set_json`] layer `serde_json` on
//! top. Entries expire at an absolute deadline, after a sliding idle window,
//! or whichever comes first when both are set.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Expiration policy for one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheEntryOptions {
    /// Time from insertion after which the entry is gone regardless of use.
    pub absolute_expiration: Option<Duration>,
    /// Idle time after which the entry is gone; every read restarts it.
    pub sliding_expiration: Option<Duration>,
}

impl CacheEntryOptions {
    pub fn absolute(ttl: Duration) -> Self {
        Self {
            absolute_expiration: Some(ttl),
            sliding_expiration: None,
        }
    }

    pub fn with_sliding(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    /// Time until the entry expires when written or read right now.
    pub(crate) fn initial_ttl(&self) -> Option<Duration> {
        match (self.absolute_expiration, self.sliding_expiration) {
            (Some(a), Some(s)) => Some(a.min(s)),
            (a, s) => a.or(s),
        }
    }
}

#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, options: CacheEntryOptions)
    -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn DistributedCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn DistributedCache,
    key: &str,
    value: &T,
    options: CacheEntryOptions,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, raw, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_ttl_takes_the_sooner_deadline() {
        let opts = CacheEntryOptions::absolute(Duration::from_secs(60))
            .with_sliding(Duration::from_secs(10));
        assert_eq!(opts.initial_ttl(), Some(Duration::from_secs(10)));
        assert_eq!(CacheEntryOptions::default().initial_ttl(), None);
    }
}

//! Redis cache backend.
//!
//! Each value is stored inside a small JSON envelope that remembers the
//! absolute deadline and sliding window, so a read can refresh the key's
//! TTL without outliving the absolute deadline.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CacheEntryOptions, CacheError, DistributedCache};

pub const DEFAULT_KEY_PREFIX: &str = "bazaar:";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "v")]
    value: String,
    /// Absolute deadline, unix epoch milliseconds.
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    absolute_ms: Option<i64>,
    /// Sliding window in milliseconds.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    sliding_ms: Option<u64>,
}

impl Envelope {
    /// Milliseconds until expiry if read at `now_ms`, or `None` for no expiry.
    /// Zero means already expired.
    fn remaining_ms(&self, now_ms: i64) -> Option<u64> {
        let absolute = self
            .absolute_ms
            .map(|deadline| u64::try_from(deadline - now_ms).unwrap_or(0));
        match (absolute, self.sliding_ms) {
            (Some(a), Some(s)) => Some(a.min(s)),
            (a, s) => a.or(s),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// [`DistributedCache`] over a shared Redis connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_str(&raw)?;

        if envelope.sliding_ms.is_some() {
            match envelope.remaining_ms(Utc::now().timestamp_millis()) {
                Some(0) => {
                    debug!(%key, "Cache entry past absolute deadline");
                    let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
                    return Ok(None);
                }
                Some(ttl) => {
                    let _: bool = redis::cmd("PEXPIRE")
                        .arg(&key)
                        .arg(ttl)
                        .query_async(&mut conn)
                        .await?;
                }
                None => {}
            }
        }
        Ok(Some(envelope.value))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        options: CacheEntryOptions,
    ) -> Result<(), CacheError> {
        let key = self.key(key);
        let now_ms = Utc::now().timestamp_millis();
        let envelope = Envelope {
            value,
            absolute_ms: options
                .absolute_expiration
                .map(|ttl| now_ms.saturating_add(i64::try_from(duration_ms(ttl)).unwrap_or(i64::MAX))),
            sliding_ms: options.sliding_expiration.map(duration_ms),
        };
        let raw = serde_json::to_string(&envelope)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(raw);
        if let Some(ttl) = options.initial_ttl() {
            cmd.arg("PX").arg(duration_ms(ttl).max(1));
        }
        let _: () = cmd.query_async(&mut self.conn.clone()).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let _: () = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_bounded_by_absolute_deadline() {
        let envelope = Envelope {
            value: String::new(),
            absolute_ms: Some(10_000),
            sliding_ms: Some(5_000),
        };
        assert_eq!(envelope.remaining_ms(0), Some(5_000));
        assert_eq!(envelope.remaining_ms(8_000), Some(2_000));
        assert_eq!(envelope.remaining_ms(12_000), Some(0));
    }

    #[test]
    fn envelope_omits_unset_fields() {
        let envelope = Envelope {
            value: "x".into(),
            absolute_ms: None,
            sliding_ms: None,
        };
        assert_eq!(serde_json::to_string(&envelope).unwrap(), r#"{"v":"x"}"#);
        assert_eq!(envelope.remaining_ms(0), None);
    }
}

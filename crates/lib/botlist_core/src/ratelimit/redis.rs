//! Redis counters over a `bb8` pool.
//!
//! Only `INCR`, `EXPIRE` and `TTL` touch the keys.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::Pool;
use bb8_redis::redis;

use super::{CounterStore, RateLimitError};

#[derive(Clone)]
pub struct RedisCounterStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisCounterStore {
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }

    /// Build a pool for `url` and wrap it.
    pub async fn connect(url: &str) -> Result<Self, RateLimitError> {
        let manager = RedisConnectionManager::new(url)?;
        let pool = Pool::builder()
            .build(manager)
            .await
            .map_err(RateLimitError::Redis)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<(i64, Duration), RateLimitError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Pool(e.to_string()))?;

        let (count, ttl): (i64, i64) = redis::pipe()
            .cmd("INCR")
            .arg(key)
            .cmd("TTL")
            .arg(key)
            .query_async(&mut *conn)
            .await?;

        // A fresh key, or one that lost its expiry, starts a new window.
        if count == 1 || ttl < 0 {
            let secs = window.as_secs().max(1);
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(secs)
                .query_async(&mut *conn)
                .await?;
            return Ok((count, Duration::from_secs(secs)));
        }

        Ok((count, Duration::from_secs(ttl.unsigned_abs())))
    }

    async fn extend(&self, key: &str, by: Duration) -> Result<(), RateLimitError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Pool(e.to_string()))?;

        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut *conn).await?;
        if ttl > 0 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl.unsigned_abs() + by.as_secs())
                .query_async(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

//! Per-identity request counters keyed on a logical bucket.
//!
//! Counters live behind [`CounterStore`] (Redis in production). A call is
//! refused once the post-increment count exceeds the bucket's maximum. A
//! refusal on a route bucket pushes the window out by
//! [`RateLimitConfig::refusal_extension`].

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha512};
use thiserror::Error;
use tracing::debug;

use crate::config::RateLimitConfig;

pub use memory::MemoryCounterStore;
pub use self::redis::RedisCounterStore;

pub const HEADER_REQ_MADE: &str = "X-Ratelimit-Req-Made";
pub const HEADER_REQ_LIMIT: &str = "X-Ratelimit-Req-Limit";
pub const HEADER_BUCKET: &str = "X-Ratelimit-Bucket";
pub const HEADER_GLOBAL: &str = "X-Global-Ratelimit";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Name of the default bucket applied to every request.
pub const GLOBAL_BUCKET: &str = "global";

/// Rate limiter errors.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] bb8_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(String),
}

/// Whether a bucket applies to every request or to one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketScope {
    Global,
    Route,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub max_requests: i64,
    pub window: Duration,
    pub scope: BucketScope,
}

impl Bucket {
    pub fn global(config: &RateLimitConfig) -> Self {
        Self {
            name: GLOBAL_BUCKET.to_string(),
            max_requests: config.global_max_requests,
            window: config.global_window,
            scope: BucketScope::Global,
        }
    }

    pub fn route(name: impl Into<String>, max_requests: i64, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window,
            scope: BucketScope::Route,
        }
    }
}

/// Outcome of counting one call against a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    pub bucket: String,
    pub made: i64,
    pub limit: i64,
    pub exceeded: bool,
    pub global: bool,
    /// Remaining window, including any refusal extension.
    pub retry_after: Duration,
}

impl Limit {
    /// Response headers describing this limit.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_REQ_MADE, self.made.to_string()),
            (HEADER_REQ_LIMIT, self.limit.to_string()),
            (HEADER_BUCKET, self.bucket.clone()),
        ];
        if self.exceeded {
            if self.global {
                headers.push((HEADER_GLOBAL, "true".to_string()));
            }
            headers.push((HEADER_RETRY_AFTER, self.retry_after_secs().to_string()));
        }
        headers
    }

    /// Whole seconds to wait, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let rounded = if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        rounded.max(1)
    }
}

/// Atomic counters with expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, starting a `window`-long expiry when the key is new
    /// or has none. Returns the new count and the remaining expiry.
    async fn incr(&self, key: &str, window: Duration) -> Result<(i64, Duration), RateLimitError>;

    /// Push the expiry of `key` out by `by`.
    async fn extend(&self, key: &str, by: Duration) -> Result<(), RateLimitError>;
}

/// Counter key for an identity in a bucket.
pub fn key(identity: &str, bucket: &str) -> String {
    format!("rl:{identity}-{bucket}")
}

/// The API-token subject when present, else the SHA-512 hex digest of the
/// first `X-Forwarded-For` hop.
pub fn identity(subject: Option<&str>, forwarded_for: Option<&str>) -> String {
    if let Some(subject) = subject {
        return subject.to_string();
    }
    let hop = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or_default();
    hex::encode(Sha512::digest(hop.as_bytes()))
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn global_bucket(&self) -> Bucket {
        Bucket::global(&self.config)
    }

    /// Count one call by `identity` against `bucket`.
    pub async fn hit(&self, identity: &str, bucket: &Bucket) -> Result<Limit, RateLimitError> {
        let key = key(identity, &bucket.name);
        let (made, mut retry_after) = self.store.incr(&key, bucket.window).await?;
        let exceeded = made > bucket.max_requests;

        if exceeded {
            if bucket.scope == BucketScope::Route {
                self.store
                    .extend(&key, self.config.refusal_extension)
                    .await?;
                retry_after += self.config.refusal_extension;
            }
            debug!(bucket = %bucket.name, made, limit = bucket.max_requests, "Rate limited");
        }

        Ok(Limit {
            bucket: bucket.name.clone(),
            made,
            limit: bucket.max_requests,
            exceeded,
            global: bucket.scope == BucketScope::Global,
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: i64) -> RateLimiter {
        let config = RateLimitConfig {
            global_max_requests: max,
            ..RateLimitConfig::default()
        };
        RateLimiter::new(Arc::new(MemoryCounterStore::new()), config)
    }

    #[test]
    fn identity_prefers_subject() {
        assert_eq!(identity(Some("123"), Some("1.2.3.4")), "123");
    }

    #[test]
    fn identity_hashes_first_forwarded_hop() {
        let a = identity(None, Some("1.2.3.4, 10.0.0.1"));
        let b = identity(None, Some(" 1.2.3.4"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert_ne!(a, identity(None, Some("5.6.7.8")));
    }

    #[test]
    fn key_format() {
        assert_eq!(key("abc", "global"), "rl:abc-global");
    }

    #[tokio::test]
    async fn refuses_after_max_requests() {
        let limiter = limiter(3);
        let bucket = limiter.global_bucket();
        let mut made = Vec::new();
        for _ in 0..3 {
            let limit = limiter.hit("u", &bucket).await.unwrap();
            assert!(!limit.exceeded);
            made.push(limit.made);
        }
        assert_eq!(made, [1, 2, 3]);

        let refused = limiter.hit("u", &bucket).await.unwrap();
        assert!(refused.exceeded);
        assert!(refused.global);
        assert!(refused.retry_after_secs() <= 120);

        let headers = refused.headers();
        assert!(headers.contains(&(HEADER_GLOBAL, "true".to_string())));
        assert!(headers.iter().any(|(name, _)| *name == HEADER_RETRY_AFTER));
    }

    #[tokio::test]
    async fn identities_are_counted_separately() {
        let limiter = limiter(1);
        let bucket = limiter.global_bucket();
        assert!(!limiter.hit("a", &bucket).await.unwrap().exceeded);
        assert!(!limiter.hit("b", &bucket).await.unwrap().exceeded);
        assert!(limiter.hit("a", &bucket).await.unwrap().exceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn route_refusal_extends_window() {
        let limiter = limiter(500);
        let bucket = Bucket::route("vote", 1, Duration::from_secs(10));
        limiter.hit("u", &bucket).await.unwrap();
        let refused = limiter.hit("u", &bucket).await.unwrap();
        assert!(refused.exceeded);
        assert!(!refused.global);
        assert_eq!(refused.retry_after, Duration::from_secs(12));
        assert!(
            !refused
                .headers()
                .iter()
                .any(|(name, _)| *name == HEADER_GLOBAL)
        );

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.hit("u", &bucket).await.unwrap().exceeded);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!limiter.hit("u", &bucket).await.unwrap().exceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_resets_count() {
        let limiter = limiter(1);
        let bucket = limiter.global_bucket();
        limiter.hit("u", &bucket).await.unwrap();
        assert!(limiter.hit("u", &bucket).await.unwrap().exceeded);
        tokio::time::advance(Duration::from_secs(121)).await;
        let limit = limiter.hit("u", &bucket).await.unwrap();
        assert!(!limit.exceeded);
        assert_eq!(limit.made, 1);
    }
}

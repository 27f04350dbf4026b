//! Tunables for the rate limiter, dispatcher, and reminder loop.
//!
//! Every struct has a `Default` carrying the production constants; the API
//! crate overrides individual fields from the environment at startup.

use std::time::Duration;

/// Outbound webhook delivery settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum attempts per event per webhook.
    pub max_attempts: u32,
    /// Per-attempt HTTP timeout.
    pub attempt_timeout: Duration,
    /// Total time budget for delivering one event, retries included.
    pub delivery_budget: Duration,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Upper bound for a single backoff delay.
    pub backoff_cap: Duration,
    /// Maximum number of outbound requests in flight across all webhooks.
    pub max_in_flight: usize,
    /// A per-webhook queue with no traffic for this long retires its worker.
    pub queue_idle: Duration,
    /// How long in-flight attempts may run after shutdown is requested.
    pub shutdown_grace: Duration,
    /// Allow loopback/private/link-local destinations (tests, local dev).
    pub allow_private_targets: bool,
    /// User agent sent with every delivery.
    pub user_agent: String,
    /// Delivery log rows older than this are pruned.
    pub log_retention: chrono::Duration,
    /// Delay between two prune passes.
    pub prune_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(5),
            delivery_budget: Duration::from_secs(60),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            max_in_flight: 64,
            queue_idle: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
            allow_private_targets: false,
            user_agent: format!("botlist/{}", crate::version()),
            log_retention: chrono::Duration::days(30),
            prune_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Request rate limiting settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window in the default global bucket.
    pub global_max_requests: i64,
    /// Window of the default global bucket.
    pub global_window: Duration,
    /// Added to a route bucket's TTL every time a call is refused.
    pub refusal_extension: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_max_requests: 500,
            global_window: Duration::from_secs(120),
            refusal_extension: Duration::from_secs(2),
        }
    }
}

/// Vote reminder loop settings.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Delay between scans.
    pub tick: Duration,
    /// Delay after a failed scan.
    pub error_backoff: Duration,
    /// Minimum time between two alerts for the same reminder.
    pub interval: chrono::Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(10),
            error_backoff: Duration::from_secs(5 * 60),
            interval: chrono::Duration::hours(4),
        }
    }
}

/// Rules applied to webhook secrets and signatures.
#[derive(Debug, Clone)]
pub struct SigningPolicy {
    /// Shortest secret accepted on upsert.
    pub min_secret_len: usize,
    /// Longest secret accepted on upsert.
    pub max_secret_len: usize,
    /// Allowed clock skew, in seconds, between sender and receiver.
    pub replay_window_secs: i64,
}

impl Default for SigningPolicy {
    fn default() -> Self {
        Self {
            min_secret_len: 1,
            max_secret_len: 512,
            replay_window_secs: 300,
        }
    }
}

/// Vote eligibility windows.
#[derive(Debug, Clone)]
pub struct VoteConfig {
    /// Hours between two votes from one user for one target.
    pub window: chrono::Duration,
    /// Shorter window used for premium bots.
    pub premium_window: chrono::Duration,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            window: chrono::Duration::hours(12),
            premium_window: chrono::Duration::hours(4),
        }
    }
}

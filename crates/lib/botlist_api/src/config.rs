//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use botlist_core::config::{
    DispatcherConfig, RateLimitConfig, ReminderConfig, SigningPolicy, VoteConfig,
};
use tracing::warn;

/// Configuration for the API server. Immutable after startup.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Redis URL for rate-limit counters. In-process counters when unset.
    pub redis_url: Option<String>,
    /// Base URL of the avatar CDN.
    pub cdn_url: String,
    /// Base URL of the public site, used in alerts and audit links.
    pub frontend_url: String,
    /// Discord-compatible webhook receiving audit embeds.
    pub mod_log_webhook: Option<String>,
    pub dispatcher: DispatcherConfig,
    pub rate_limit: RateLimitConfig,
    pub reminders: ReminderConfig,
    pub votes: VoteConfig,
    pub signing: SigningPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            pg_connection_url: "postgres://localhost:5432/botlist".into(),
            redis_url: None,
            cdn_url: "https://cdn.botlist.example".into(),
            frontend_url: "https://botlist.example".into(),
            mod_log_webhook: None,
            dispatcher: DispatcherConfig::default(),
            rate_limit: RateLimitConfig::default(),
            reminders: ReminderConfig::default(),
            votes: VoteConfig::default(),
            signing: SigningPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                              |
    /// |--------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                    | `127.0.0.1:8080`                     |
    /// | `DATABASE_URL`                 | `postgres://localhost:5432/botlist`  |
    /// | `REDIS_URL`                    | unset (in-process counters)          |
    /// | `CDN_URL`                      | `https://cdn.botlist.example`        |
    /// | `FRONTEND_URL`                 | `https://botlist.example`            |
    /// | `MOD_LOG_WEBHOOK`              | unset (audit events are logged)      |
    /// | `WEBHOOK_MAX_ATTEMPTS`         | `5`                                  |
    /// | `WEBHOOK_TIMEOUT_SECS`         | `5`                                  |
    /// | `WEBHOOK_ALLOW_PRIVATE`        | `false`                              |
    /// | `GLOBAL_RATELIMIT_MAX`         | `500`                                |
    /// | `GLOBAL_RATELIMIT_WINDOW_SECS` | `120`                                |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut dispatcher = defaults.dispatcher;
        dispatcher.max_attempts = env_parse("WEBHOOK_MAX_ATTEMPTS", dispatcher.max_attempts);
        dispatcher.attempt_timeout = Duration::from_secs(env_parse(
            "WEBHOOK_TIMEOUT_SECS",
            dispatcher.attempt_timeout.as_secs(),
        ));
        dispatcher.allow_private_targets =
            env_parse("WEBHOOK_ALLOW_PRIVATE", dispatcher.allow_private_targets);

        let mut rate_limit = defaults.rate_limit;
        rate_limit.global_max_requests =
            env_parse("GLOBAL_RATELIMIT_MAX", rate_limit.global_max_requests);
        rate_limit.global_window = Duration::from_secs(env_parse(
            "GLOBAL_RATELIMIT_WINDOW_SECS",
            rate_limit.global_window.as_secs(),
        ));

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            pg_connection_url: std::env::var("DATABASE_URL").unwrap_or(defaults.pg_connection_url),
            redis_url: env_opt("REDIS_URL"),
            cdn_url: std::env::var("CDN_URL").unwrap_or(defaults.cdn_url),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            mod_log_webhook: env_opt("MOD_LOG_WEBHOOK"),
            dispatcher,
            rate_limit,
            reminders: defaults.reminders,
            votes: defaults.votes,
            signing: defaults.signing,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `name`, falling back to `default` when unset or malformed.
fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Ignoring malformed setting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_core_constants() {
        let config = ApiConfig::default();
        assert_eq!(config.rate_limit.global_max_requests, 500);
        assert_eq!(config.rate_limit.global_window, Duration::from_secs(120));
        assert_eq!(config.dispatcher.max_attempts, 5);
        assert!(!config.dispatcher.allow_private_targets);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        assert_eq!(env_parse("BOTLIST_TEST_UNSET_VARIABLE", 7u32), 7);
    }
}

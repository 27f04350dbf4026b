//! Webhook registry rows and delivery log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityRef;

/// A registered outbound endpoint for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: Uuid,
    pub target: EntityRef,
    pub name: String,
    pub url: String,
    pub secret: String,
    /// Quarantined endpoints are skipped until an upsert or successful delivery.
    pub broken: bool,
    /// Send the secret as `Authorization` instead of signing the body.
    pub simple_auth: bool,
    /// Empty means every event type is delivered.
    pub event_whitelist: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn accepts(&self, event_type: &str) -> bool {
        self.event_whitelist.is_empty() || self.event_whitelist.iter().any(|e| e == event_type)
    }
}

/// Error category of a delivery attempt. Absent on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryError {
    Timeout,
    Tls,
    Dns,
    Network,
    HttpStatus,
    Blocked,
    Aborted,
    SkippedBroken,
    NotWhitelisted,
}

impl DeliveryError {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryError::Timeout => "timeout",
            DeliveryError::Tls => "tls",
            DeliveryError::Dns => "dns",
            DeliveryError::Network => "network",
            DeliveryError::HttpStatus => "http_status",
            DeliveryError::Blocked => "blocked",
            DeliveryError::Aborted => "aborted",
            DeliveryError::SkippedBroken => "skipped_broken",
            DeliveryError::NotWhitelisted => "not_whitelisted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(DeliveryError::Timeout),
            "tls" => Some(DeliveryError::Tls),
            "dns" => Some(DeliveryError::Dns),
            "network" => Some(DeliveryError::Network),
            "http_status" => Some(DeliveryError::HttpStatus),
            "blocked" => Some(DeliveryError::Blocked),
            "aborted" => Some(DeliveryError::Aborted),
            "skipped_broken" => Some(DeliveryError::SkippedBroken),
            "not_whitelisted" => Some(DeliveryError::NotWhitelisted),
            _ => None,
        }
    }
}

/// One row of the append-only delivery log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub target: EntityRef,
    /// 1-based; 0 for records written without an HTTP attempt.
    pub attempt: i32,
    pub status_code: Option<i32>,
    pub latency_ms: i64,
    pub error: Option<DeliveryError>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// `success` or the error category.
    pub fn outcome(&self) -> &'static str {
        match self.error {
            None => "success",
            Some(e) => e.as_str(),
        }
    }
}

/// Change to a webhook's `broken` flag committed together with a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenTransition {
    Unchanged,
    MarkBroken,
    Clear,
}

/// Number of deliveries per outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCount {
    pub outcome: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetType;

    fn hook(whitelist: &[&str]) -> Webhook {
        Webhook {
            id: Uuid::new_v4(),
            target: EntityRef::new(TargetType::Bot, "1"),
            name: "main".into(),
            url: "https://e.example/hook".into(),
            secret: "s".into(),
            broken: false,
            simple_auth: false,
            event_whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_whitelist_accepts_everything() {
        assert!(hook(&[]).accepts("vote"));
        assert!(hook(&[]).accepts("alert"));
    }

    #[test]
    fn whitelist_filters_event_types() {
        let h = hook(&["vote"]);
        assert!(h.accepts("vote"));
        assert!(!h.accepts("alert"));
    }

    #[test]
    fn delivery_error_names_are_stable() {
        for e in [
            DeliveryError::Timeout,
            DeliveryError::Tls,
            DeliveryError::Dns,
            DeliveryError::Network,
            DeliveryError::HttpStatus,
            DeliveryError::Blocked,
            DeliveryError::Aborted,
            DeliveryError::SkippedBroken,
            DeliveryError::NotWhitelisted,
        ] {
            assert_eq!(DeliveryError::parse(e.as_str()), Some(e));
            let json = serde_json::to_value(e).unwrap();
            assert_eq!(json, serde_json::Value::String(e.as_str().to_string()));
        }
    }
}

//! Outbound event envelope and its canonical encoding.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::models::{EntityRef, TargetType};

pub const EVENT_VOTE: &str = "vote";
pub const EVENT_ALERT: &str = "alert";

/// Event types a webhook may whitelist.
pub const EVENT_TYPES: &[&str] = &[EVENT_VOTE, EVENT_ALERT];

/// Envelope delivered to every webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    /// Epoch seconds.
    pub created_at: i64,
    pub event_type: String,
    pub target: EntityRef,
    pub payload: Value,
}

/// Body of a `vote` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePayload {
    pub votes: i64,
    pub voter_user_id: String,
    /// Receivers must not apply side effects for test votes.
    pub test: bool,
}

/// Body of an `alert` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub message: String,
    pub url: String,
    pub icon: String,
}

impl Event {
    pub fn new(event_type: &str, target: EntityRef, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            created_at: Utc::now().timestamp(),
            event_type: event_type.to_string(),
            target,
            payload,
        }
    }

    pub fn vote(target: EntityRef, payload: &VotePayload) -> Self {
        Self::new(
            EVENT_VOTE,
            target,
            json!({
                "votes": payload.votes,
                "voter_user_id": payload.voter_user_id,
                "test": payload.test,
            }),
        )
    }

    /// Vote event sent by the test endpoint. `test` is always true.
    pub fn test_vote(target: EntityRef, votes: i64, voter_user_id: &str) -> Self {
        Self::vote(
            target,
            &VotePayload {
                votes,
                voter_user_id: voter_user_id.to_string(),
                test: true,
            },
        )
    }

    /// Alert addressed to a user's own push webhooks.
    pub fn alert(user_id: &str, payload: &AlertPayload) -> Self {
        Self::new(
            EVENT_ALERT,
            EntityRef::new(TargetType::User, user_id),
            json!({
                "title": payload.title,
                "message": payload.message,
                "url": payload.url,
                "icon": payload.icon,
            }),
        )
    }

    /// Compact JSON with object keys sorted at every level. This is the exact
    /// byte string that gets signed.
    pub fn canonical_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_vec(&canonicalize(value))
    }
}

/// Rebuild objects with sorted keys, whatever map ordering serde_json uses.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

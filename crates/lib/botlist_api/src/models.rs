//! Request and response bodies.

use botlist_core::models::{DeliveryAttempt, DeliveryError, EntityRef, OutcomeCount, Webhook};
use botlist_core::webhooks::{AttemptOutcome, WebhookInput};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_connected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermsResponse {
    pub perms: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub team_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    pub flags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditMemberRequest {
    pub flags: Vec<String>,
}

/// Body of `PATCH /webhooks/{tt}/{tid}`. Omitting `id` creates a webhook.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    pub url: String,
    pub secret: String,
    #[serde(default)]
    pub simple_auth: bool,
    #[serde(default)]
    pub event_whitelist: Vec<String>,
}

impl WebhookRequest {
    pub fn into_input(self) -> (Option<Uuid>, WebhookInput) {
        (
            self.id,
            WebhookInput {
                name: self.name,
                url: self.url,
                secret: self.secret,
                simple_auth: self.simple_auth,
                event_whitelist: self.event_whitelist,
            },
        )
    }
}

/// A webhook as returned to callers. The secret is never echoed.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub target: EntityRef,
    pub name: String,
    pub url: String,
    pub broken: bool,
    pub simple_auth: bool,
    pub event_whitelist: Vec<String>,
    pub created_at: String,
}

impl From<Webhook> for WebhookResponse {
    fn from(w: Webhook) -> Self {
        Self {
            id: w.id,
            target: w.target,
            name: w.name,
            url: w.url,
            broken: w.broken,
            simple_auth: w.simple_auth,
            event_whitelist: w.event_whitelist,
            created_at: w.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookListResponse {
    pub webhooks: Vec<WebhookResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearWebhooksResponse {
    pub removed: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliveryLogResponse {
    pub entries: Vec<DeliveryAttempt>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Body of `POST /webhooks/test`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestWebhookRequest {
    pub url: String,
    pub secret: String,
    pub votes: i64,
    pub user_id: String,
    pub bot_id: String,
    #[serde(default)]
    pub simple_auth: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestWebhookResponse {
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: i64,
    pub error: Option<DeliveryError>,
    pub detail: Option<String>,
}

impl From<AttemptOutcome> for TestWebhookResponse {
    fn from(o: AttemptOutcome) -> Self {
        Self {
            success: o.is_success(),
            status_code: o.status_code,
            latency_ms: o.latency_ms,
            error: o.error,
            detail: o.detail,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VoteQuery {
    pub upvote: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub id: Uuid,
    pub votes: i64,
    pub webhooks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityResponse {
    pub can_vote: bool,
    pub last_vote: Option<String>,
    pub next_vote_at: Option<String>,
    pub window_secs: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub credits: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteLogsResponse {
    pub outcomes: Vec<OutcomeCount>,
}

//! Mod-log audit events emitted by mutating operations.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Longest embed field value accepted by Discord.
const MAX_FIELD_LEN: usize = 1024;
const EMBED_COLOR: u32 = 0x5865f2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// One audit entry: who did what, with a link to the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub title: String,
    pub actor: String,
    pub url: Option<String>,
    pub fields: Vec<AuditField>,
}

impl AuditEvent {
    pub fn new(title: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            actor: actor.into(),
            url: None,
            fields: Vec::new(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(AuditField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    /// Discord webhook body with a single embed.
    pub fn to_embed(&self) -> Value {
        let mut fields = vec![json!({
            "name": "User",
            "value": format!("<@{}>", self.actor),
            "inline": true,
        })];
        fields.extend(self.fields.iter().map(|f| {
            json!({
                "name": f.name,
                "value": truncate(&f.value, MAX_FIELD_LEN),
                "inline": f.inline,
            })
        }));
        let mut embed = json!({
            "title": self.title,
            "color": EMBED_COLOR,
            "fields": fields,
        });
        if let Some(url) = &self.url {
            embed["url"] = json!(url);
        }
        json!({ "embeds": [embed] })
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

/// Destination of audit events. Emitting never fails the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent);
}

/// Writes audit events to the log.
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn emit(&self, event: AuditEvent) {
        info!(
            title = %event.title,
            actor = %event.actor,
            url = event.url.as_deref().unwrap_or(""),
            fields = event.fields.len(),
            "Audit event"
        );
    }
}

/// Posts audit events as embeds to a Discord-compatible webhook.
pub struct ModLogSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl ModLogSink {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl AuditSink for ModLogSink {
    async fn emit(&self, event: AuditEvent) {
        let result = self
            .client
            .post(&self.webhook_url)
            .json(&event.to_embed())
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            warn!(title = %event.title, "Failed to post mod-log embed: {e}");
        }
    }
}

/// Keeps emitted events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn emit(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_carries_actor_fields_and_url() {
        let event = AuditEvent::new("Bot Transferred", "42")
            .url("https://botlist.example/bot/2")
            .field("From", "team-1")
            .field("To", "team-2");
        let body = event.to_embed();
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "Bot Transferred");
        assert_eq!(embed["url"], "https://botlist.example/bot/2");
        assert_eq!(embed["fields"][0]["value"], "<@42>");
        assert_eq!(embed["fields"][2]["name"], "To");
        assert_eq!(embed["fields"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn long_field_values_are_truncated() {
        let event = AuditEvent::new("Edited", "1").field("Long", "x".repeat(5000));
        let value = event.to_embed()["embeds"][0]["fields"][1]["value"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(value.chars().count(), MAX_FIELD_LEN);
        assert!(value.ends_with("..."));
    }

    #[tokio::test]
    async fn memory_sink_records_events() {
        let sink = MemoryAuditSink::new();
        sink.emit(AuditEvent::new("Deleted", "1")).await;
        assert_eq!(sink.events().len(), 1);
        assert!(!event_has_url(&sink.events()[0]));
    }

    fn event_has_url(event: &AuditEvent) -> bool {
        event.to_embed()["embeds"][0].get("url").is_some()
    }
}

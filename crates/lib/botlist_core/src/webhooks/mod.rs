//! Webhook registry, event envelope, signing and delivery.
//!
//! [`Registry`] validates writes before they reach the [`WebhookStore`]. The
//! [`Dispatcher`] delivers events to the stored endpoints.

pub mod dispatcher;
pub mod events;
pub mod retention;
pub mod signing;
pub mod target;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::SigningPolicy;
use crate::models::{EntityRef, Webhook};
use crate::store::{StoreError, WebhookStore};
use crate::uuid::uuidv7;

pub use dispatcher::{AttemptOutcome, DispatchError, Dispatcher};
pub use events::{AlertPayload, EVENT_ALERT, EVENT_TYPES, EVENT_VOTE, Event, VotePayload};

/// Longest accepted webhook name.
pub const MAX_NAME_LEN: usize = 64;

/// Webhook registry errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("{message}")]
    InvalidInput { message: String, fields: Vec<String> },

    #[error("Webhook not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Caller-supplied fields of a webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookInput {
    pub name: String,
    pub url: String,
    pub secret: String,
    pub simple_auth: bool,
    pub event_whitelist: Vec<String>,
}

impl WebhookInput {
    /// Every invalid field, in declaration order.
    pub fn invalid_fields(&self, policy: &SigningPolicy) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name.chars().count() > MAX_NAME_LEN {
            fields.push("name".to_string());
        }
        let scheme_ok = self.url.starts_with("https://") || self.url.starts_with("http://");
        if !scheme_ok || url::Url::parse(&self.url).map(|u| u.host().is_none()).unwrap_or(true) {
            fields.push("url".to_string());
        }
        let len = self.secret.len();
        if len < policy.min_secret_len || len > policy.max_secret_len {
            fields.push("secret".to_string());
        }
        if self
            .event_whitelist
            .iter()
            .any(|e| !EVENT_TYPES.contains(&e.as_str()))
        {
            fields.push("event_whitelist".to_string());
        }
        fields
    }
}

/// Validated access to the webhooks of an entity.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn WebhookStore>,
    policy: SigningPolicy,
}

impl Registry {
    pub fn new(store: Arc<dyn WebhookStore>, policy: SigningPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn WebhookStore> {
        &self.store
    }

    pub fn policy(&self) -> &SigningPolicy {
        &self.policy
    }

    pub async fn list(&self, target: &EntityRef) -> Result<Vec<Webhook>, WebhookError> {
        Ok(self.store.list(target).await?)
    }

    pub async fn get(&self, target: &EntityRef, id: Uuid) -> Result<Webhook, WebhookError> {
        self.store
            .get(target, id)
            .await?
            .ok_or(WebhookError::NotFound(id))
    }

    /// Create a webhook, or replace `id` when given. The result is never
    /// broken.
    pub async fn upsert(
        &self,
        target: &EntityRef,
        id: Option<Uuid>,
        input: WebhookInput,
    ) -> Result<Webhook, WebhookError> {
        let fields = input.invalid_fields(&self.policy);
        if !fields.is_empty() {
            return Err(WebhookError::InvalidInput {
                message: format!("Invalid webhook fields: {}", fields.join(", ")),
                fields,
            });
        }

        let webhook = Webhook {
            id: id.unwrap_or_else(uuidv7),
            target: target.clone(),
            name: input.name,
            url: input.url,
            secret: input.secret,
            broken: false,
            simple_auth: input.simple_auth,
            event_whitelist: input.event_whitelist,
            created_at: Utc::now(),
        };
        Ok(self.store.upsert(&webhook).await?)
    }

    /// Remove every webhook of `target`.
    pub async fn clear(&self, target: &EntityRef) -> Result<u64, WebhookError> {
        Ok(self.store.clear(target).await?)
    }

    pub async fn delete(&self, target: &EntityRef, id: Uuid) -> Result<(), WebhookError> {
        if !self.store.delete(target, id).await? {
            return Err(WebhookError::NotFound(id));
        }
        Ok(())
    }

    pub async fn mark_broken(&self, target: &EntityRef, id: Uuid) -> Result<(), WebhookError> {
        if !self.store.mark_broken(target, id).await? {
            return Err(WebhookError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetType;
    use crate::store::MemoryStore;

    fn input(url: &str, secret: &str) -> WebhookInput {
        WebhookInput {
            name: "main".into(),
            url: url.into(),
            secret: secret.into(),
            ..WebhookInput::default()
        }
    }

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryStore::new()), SigningPolicy::default())
    }

    #[test]
    fn validation_reports_every_bad_field() {
        let policy = SigningPolicy::default();
        assert!(input("https://e.example/hook", "s").invalid_fields(&policy).is_empty());

        let bad = WebhookInput {
            name: "x".repeat(65),
            url: "ftp://e.example".into(),
            secret: String::new(),
            simple_auth: false,
            event_whitelist: vec!["vote".into(), "deploy".into()],
        };
        assert_eq!(
            bad.invalid_fields(&policy),
            ["name", "url", "secret", "event_whitelist"]
        );
        assert_eq!(input("https://", "s").invalid_fields(&policy), ["url"]);
    }

    #[tokio::test]
    async fn upsert_then_get_and_delete() {
        let registry = registry();
        let target = EntityRef::new(TargetType::Bot, "2");
        let hook = registry
            .upsert(&target, None, input("https://e.example/hook", "s"))
            .await
            .unwrap();
        assert!(!hook.broken);
        assert_eq!(registry.get(&target, hook.id).await.unwrap().url, hook.url);

        registry.mark_broken(&target, hook.id).await.unwrap();
        assert!(registry.get(&target, hook.id).await.unwrap().broken);

        let replaced = registry
            .upsert(&target, Some(hook.id), input("https://e.example/v2", "s2"))
            .await
            .unwrap();
        assert!(!replaced.broken);
        assert_eq!(registry.list(&target).await.unwrap().len(), 1);

        registry.delete(&target, hook.id).await.unwrap();
        assert!(matches!(
            registry.get(&target, hook.id).await,
            Err(WebhookError::NotFound(_))
        ));
        assert!(matches!(
            registry.delete(&target, hook.id).await,
            Err(WebhookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_upsert_writes_nothing() {
        let registry = registry();
        let target = EntityRef::new(TargetType::Bot, "2");
        let err = registry
            .upsert(&target, None, input("javascript:alert(1)", "s"))
            .await
            .unwrap_err();
        match err {
            WebhookError::InvalidInput { fields, .. } => assert_eq!(fields, ["url"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(registry.list(&target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_removes_all_hooks_of_target() {
        let registry = registry();
        let target = EntityRef::new(TargetType::Server, "9");
        for url in ["https://a.example", "https://b.example"] {
            registry.upsert(&target, None, input(url, "s")).await.unwrap();
        }
        assert_eq!(registry.clear(&target).await.unwrap(), 2);
        assert!(registry.list(&target).await.unwrap().is_empty());
    }
}

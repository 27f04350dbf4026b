//! Authorization gate.
//!
//! Every mutating operation calls [`Gate::check`] before touching storage.
//! Member edits additionally pass through [`Gate::check_delegation`].

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::graph::get_entity_perms;
use crate::models::EntityRef;
use crate::perms::{self, Permission, PermissionError, check_patch_changes};
use crate::store::{EntityStore, StoreError};

/// Authorization failures.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthzError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AuthzError::NotFound(msg),
            StoreError::Conflict(msg) => AuthzError::Conflict(msg),
            other => AuthzError::Store(other),
        }
    }
}

impl From<PermissionError> for AuthzError {
    fn from(e: PermissionError) -> Self {
        AuthzError::Forbidden(e.to_string())
    }
}

/// The single decision point for "may this actor do this to that entity".
#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn EntityStore>,
}

impl Gate {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Effective permissions of `actor` on `target`.
    pub async fn effective(
        &self,
        actor: &str,
        target: &EntityRef,
    ) -> Result<Vec<Permission>, AuthzError> {
        Ok(get_entity_perms(self.store.as_ref(), actor, target).await?)
    }

    /// Require `requested` on `target`. Returns the actor's effective
    /// permissions so callers can reuse them for delegation checks.
    pub async fn check(
        &self,
        actor: Option<&str>,
        target: &EntityRef,
        requested: &Permission,
    ) -> Result<Vec<Permission>, AuthzError> {
        let actor = actor.ok_or(AuthzError::Unauthenticated)?;
        let effective = self.effective(actor, target).await?;

        if !perms::matches(&effective, requested) {
            debug!(actor, target = %target, permission = %requested, "Permission denied");
            return Err(AuthzError::Forbidden(format!(
                "You do not have permission {requested} on {target}"
            )));
        }

        Ok(effective)
    }

    /// Whether `actor` may change a member's flags from `current` to `new`.
    pub fn check_delegation(
        actor_perms: &[Permission],
        current: &[Permission],
        new: &[Permission],
    ) -> Result<(), AuthzError> {
        check_patch_changes(actor_perms, current, new)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityOwner, TargetType, TeamMember};
    use crate::store::MemoryStore;

    fn p(s: &str) -> Permission {
        Permission::parse(s).unwrap()
    }

    fn gate() -> Gate {
        let store = MemoryStore::new();
        store.add_user("u", "token-u");
        store.add_team("t1", "Team");
        store.add_member("t1", TeamMember::new("u", vec!["bot.add".into(), "bot.edit".into()]));
        store.add_entity(&EntityRef::new(TargetType::Bot, "b"), EntityOwner::Team("t1".into()));
        Gate::new(Arc::new(store))
    }

    #[tokio::test]
    async fn member_without_permission_is_forbidden() {
        let gate = gate();
        let bot = EntityRef::new(TargetType::Bot, "b");
        let err = gate.check(Some("u"), &bot, &p("bot.delete")).await.unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(_)));
        assert!(gate.check(Some("u"), &bot, &p("bot.edit")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_actor_is_unauthenticated() {
        let gate = gate();
        let bot = EntityRef::new(TargetType::Bot, "b");
        let err = gate.check(None, &bot, &p("bot.edit")).await.unwrap_err();
        assert!(matches!(err, AuthzError::Unauthenticated));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let gate = gate();
        let err = gate
            .check(Some("u"), &EntityRef::new(TargetType::Bot, "missing"), &p("bot.edit"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::NotFound(_)));
    }

    #[test]
    fn delegation_refusal_is_forbidden() {
        let actor = vec![p("bot.add")];
        let err = Gate::check_delegation(&actor, &[], &[p("bot.delete")]).unwrap_err();
        assert!(matches!(err, AuthzError::Forbidden(_)));
        assert!(Gate::check_delegation(&actor, &[], &[p("bot.add")]).is_ok());
    }
}

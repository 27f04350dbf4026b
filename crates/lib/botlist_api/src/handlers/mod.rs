//! Request handlers.

pub mod bots;
pub mod health;
pub mod perms;
pub mod teams;
pub mod users;
pub mod votes;
pub mod webhooks;

use botlist_core::models::{EntityRef, TargetType};
use botlist_core::perms::Permission;

use crate::error::{AppError, AppResult};

/// Build an entity reference from `{tt}`/`{tid}` path segments.
pub(crate) fn target(target_type: &str, id: &str) -> AppResult<EntityRef> {
    let target_type = TargetType::parse(target_type).ok_or_else(|| {
        AppError::invalid_fields(
            format!("Invalid target type: {target_type}"),
            vec!["target_type".into()],
        )
    })?;
    Ok(EntityRef::new(target_type, id))
}

/// `{namespace}.{action}` for the entity kind of `target`.
pub(crate) fn perm(target: &EntityRef, action: &str) -> Permission {
    Permission::new(target.target_type.namespace(), action)
}

//! Effective permissions of a user against an entity.
//!
//! Read-only and uncached. Ownership and membership are looked up through
//! [`EntityStore`] by id; no in-memory links between users, teams and members
//! are held.

use crate::models::{EntityOwner, EntityRef, TargetType};
use crate::perms::{self, GLOBAL, Permission, WILDCARD};
use crate::store::{EntityStore, StoreError};

/// Effective permissions of `user_id` on `target`.
///
/// - A user has `user.*` on themselves and nothing on other users.
/// - A team member gets their flags; non-members get nothing.
/// - The sole owner of a bot, server or pack gets `{namespace}.*`. For a
///   team-owned entity the member's flags are scoped to the entity's
///   namespace plus the team-global ones.
///
/// Staff permissions are appended in every case. Fails with `NotFound` when
/// a team or owned entity does not exist.
pub async fn get_entity_perms(
    store: &dyn EntityStore,
    user_id: &str,
    target: &EntityRef,
) -> Result<Vec<Permission>, StoreError> {
    let mut perms = match target.target_type {
        TargetType::User => {
            if target.id == user_id {
                vec![Permission::wildcard(TargetType::User.namespace())]
            } else {
                Vec::new()
            }
        }
        TargetType::Team => {
            if !store.team_exists(&target.id).await? {
                return Err(StoreError::NotFound(format!("team {}", target.id)));
            }
            member_perms(store, &target.id, user_id).await?
        }
        TargetType::Bot | TargetType::Server | TargetType::Pack => {
            match store.entity_owner(target).await? {
                None => return Err(StoreError::NotFound(target.to_string())),
                Some(EntityOwner::User(owner)) if owner == user_id => {
                    vec![Permission::wildcard(target.target_type.namespace())]
                }
                Some(EntityOwner::User(_)) => Vec::new(),
                Some(EntityOwner::Team(team_id)) => {
                    let namespace = target.target_type.namespace();
                    member_perms(store, &team_id, user_id)
                        .await?
                        .into_iter()
                        .filter(|p| {
                            let ns = p.namespace();
                            ns == namespace || ns == GLOBAL || ns == WILDCARD
                        })
                        .collect()
                }
            }
        }
    };

    if let Some(staff) = store.staff_permissions(user_id).await? {
        perms.extend(staff.resolve());
    }

    Ok(perms)
}

/// Parsed flags of a member. Malformed stored flags are skipped.
async fn member_perms(
    store: &dyn EntityStore,
    team_id: &str,
    user_id: &str,
) -> Result<Vec<Permission>, StoreError> {
    Ok(store
        .member_flags(team_id, user_id)
        .await?
        .map(|flags| perms::parse_stored(&flags))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamMember;
    use crate::perms::{PartialPosition, StaffPermissionSet, matches, to_strings};
    use crate::store::MemoryStore;

    fn p(s: &str) -> Permission {
        Permission::parse(s).unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_user("owner", "t-owner");
        store.add_user("member", "t-member");
        store.add_user("stranger", "t-stranger");
        store.add_team("team-1", "Team One");
        store.add_member(
            "team-1",
            TeamMember::new("owner", vec!["global.*".into()]),
        );
        store.add_member(
            "team-1",
            TeamMember::new(
                "member",
                vec!["bot.add".into(), "server.edit".into(), "team.view".into(), "*.view".into()],
            ),
        );
        store.add_entity(&EntityRef::new(TargetType::Bot, "bot-team"), EntityOwner::Team("team-1".into()));
        store.add_entity(&EntityRef::new(TargetType::Bot, "bot-solo"), EntityOwner::User("stranger".into()));
        store
    }

    #[tokio::test]
    async fn user_target_is_self_only() {
        let store = store();
        let own = get_entity_perms(&store, "member", &EntityRef::new(TargetType::User, "member"))
            .await
            .unwrap();
        assert_eq!(to_strings(&own), ["user.*"]);
        let other = get_entity_perms(&store, "member", &EntityRef::new(TargetType::User, "owner"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn team_target_yields_member_flags() {
        let store = store();
        let team = EntityRef::new(TargetType::Team, "team-1");
        let perms = get_entity_perms(&store, "member", &team).await.unwrap();
        assert_eq!(perms.len(), 4);
        let none = get_entity_perms(&store, "stranger", &team).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn missing_team_is_not_found() {
        let store = store();
        let err = get_entity_perms(&store, "member", &EntityRef::new(TargetType::Team, "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn team_owned_entity_scopes_flags() {
        let store = store();
        let bot = EntityRef::new(TargetType::Bot, "bot-team");
        let perms = get_entity_perms(&store, "member", &bot).await.unwrap();
        assert_eq!(to_strings(&perms), ["bot.add", "*.view"]);
        assert!(!matches(&perms, &p("server.edit")));
    }

    #[tokio::test]
    async fn sole_owner_gets_namespace_wildcard() {
        let store = store();
        let bot = EntityRef::new(TargetType::Bot, "bot-solo");
        let perms = get_entity_perms(&store, "stranger", &bot).await.unwrap();
        assert_eq!(to_strings(&perms), ["bot.*"]);
        let other = get_entity_perms(&store, "member", &bot).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let store = store();
        let err = get_entity_perms(&store, "member", &EntityRef::new(TargetType::Pack, "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn staff_permissions_are_appended() {
        let store = store();
        store.set_staff(
            "stranger",
            StaffPermissionSet {
                user_positions: vec![PartialPosition {
                    id: "mod".into(),
                    index: 1,
                    perms: vec![p("bot.delete")],
                }],
                perm_overrides: vec![],
            },
        );
        let perms = get_entity_perms(&store, "stranger", &EntityRef::new(TargetType::Bot, "bot-team"))
            .await
            .unwrap();
        assert!(matches(&perms, &p("bot.delete")));
    }

    #[tokio::test]
    async fn malformed_stored_flags_are_skipped() {
        let store = store();
        store.add_member("team-1", TeamMember::new("stranger", vec!["not a flag".into(), "bot.add".into()]));
        let perms = get_entity_perms(&store, "stranger", &EntityRef::new(TargetType::Team, "team-1"))
            .await
            .unwrap();
        assert_eq!(to_strings(&perms), ["bot.add"]);
    }
}

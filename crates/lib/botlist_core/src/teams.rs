//! Team membership rules and ownership transfer.
//!
//! Member changes are expressed as edits over the full member list of one
//! team, so the store can apply them inside a single transaction with the
//! rows locked. Every edit preserves the owner invariant: a non-empty team
//! always has at least one member holding `global.*`.

use thiserror::Error;
use tracing::info;

use crate::authz::{AuthzError, Gate};
use crate::models::{EntityOwner, EntityRef, TargetType, TeamMember};
use crate::perms::{self, Permission, PermissionError};
use crate::store::{EntityStore, StoreError, TeamStore};

/// An edit applied to a locked member list.
pub type MemberEdit = Box<dyn FnOnce(&mut Vec<TeamMember>) -> Result<(), TeamError> + Send>;

/// Team errors.
#[derive(Debug, Error)]
pub enum TeamError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

impl From<PermissionError> for TeamError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::InvalidPermission(_) => TeamError::InvalidInput(e.to_string()),
            PermissionError::Delegation(msg) => TeamError::Forbidden(msg),
        }
    }
}

fn is_owner(member: &TeamMember) -> bool {
    let owner = Permission::owner().to_string();
    member.flags.iter().any(|f| *f == owner)
}

fn ensure_owner(members: &[TeamMember]) -> Result<(), TeamError> {
    if members.is_empty() || members.iter().any(is_owner) {
        return Ok(());
    }
    Err(TeamError::Conflict(
        "There needs to be one other owner before you can remove yourself from owner".into(),
    ))
}

fn member_flags(member: &TeamMember) -> Vec<Permission> {
    perms::parse_stored(&member.flags)
}

/// Add `user_id` with `flags`. The manager may only grant what they hold.
pub fn apply_add(
    members: &mut Vec<TeamMember>,
    manager: &[Permission],
    user_id: &str,
    flags: &[Permission],
) -> Result<(), TeamError> {
    if members.iter().any(|m| m.user_id == user_id) {
        return Err(TeamError::Conflict("User is already a member of this team".into()));
    }
    Gate::check_delegation(manager, &[], flags)?;
    members.push(TeamMember::new(user_id, perms::to_strings(flags)));
    ensure_owner(members)
}

/// Replace the flags of `user_id`.
pub fn apply_edit(
    members: &mut [TeamMember],
    manager: &[Permission],
    user_id: &str,
    flags: &[Permission],
) -> Result<(), TeamError> {
    let member = members
        .iter_mut()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| TeamError::NotFound("User is not a member of this team".into()))?;

    Gate::check_delegation(manager, &member_flags(member), flags)?;
    member.flags = perms::to_strings(flags);
    ensure_owner(members)
}

/// Remove `user_id`. Removing someone else requires holding every flag
/// they have.
pub fn apply_remove(
    members: &mut Vec<TeamMember>,
    manager: &[Permission],
    actor: &str,
    user_id: &str,
) -> Result<(), TeamError> {
    let index = members
        .iter()
        .position(|m| m.user_id == user_id)
        .ok_or_else(|| TeamError::NotFound("User is not a member of this team".into()))?;

    if actor != user_id
        && let Some(missing) = member_flags(&members[index])
            .into_iter()
            .find(|flag| !perms::matches(manager, &flag.base()))
    {
        return Err(TeamError::Forbidden(format!(
            "You do not have permission to delete this member, missing permission: {missing}"
        )));
    }

    members.remove(index);
    ensure_owner(members)
}

fn team_ref(team_id: &str) -> EntityRef {
    EntityRef::new(TargetType::Team, team_id)
}

/// `PUT /teams/{tid}/members`
pub async fn add_member(
    gate: &Gate,
    entities: &dyn EntityStore,
    teams: &dyn TeamStore,
    actor: &str,
    team_id: &str,
    user_id: &str,
    flags: Vec<Permission>,
) -> Result<(), TeamError> {
    let manager = gate
        .check(Some(actor), &team_ref(team_id), &Permission::new("team_member", "add"))
        .await?;

    if !entities.user_exists(user_id).await? {
        return Err(TeamError::InvalidInput(
            "User must login here at least once before you can add them".into(),
        ));
    }

    let user = user_id.to_string();
    teams
        .edit_members(
            team_id,
            Box::new(move |members| apply_add(members, &manager, &user, &flags)),
        )
        .await?;
    info!(team_id, user_id, actor, "Added team member");
    Ok(())
}

/// `PATCH /teams/{tid}/members/{uid}`
pub async fn edit_member(
    gate: &Gate,
    teams: &dyn TeamStore,
    actor: &str,
    team_id: &str,
    user_id: &str,
    flags: Vec<Permission>,
) -> Result<(), TeamError> {
    let manager = gate
        .check(Some(actor), &team_ref(team_id), &Permission::new("team_member", "edit"))
        .await?;

    let user = user_id.to_string();
    teams
        .edit_members(
            team_id,
            Box::new(move |members| apply_edit(members, &manager, &user, &flags)),
        )
        .await?;
    info!(team_id, user_id, actor, "Edited team member flags");
    Ok(())
}

/// `DELETE /teams/{tid}/members/{uid}`. Members may always remove themselves.
pub async fn remove_member(
    gate: &Gate,
    teams: &dyn TeamStore,
    actor: &str,
    team_id: &str,
    user_id: &str,
) -> Result<(), TeamError> {
    let team = team_ref(team_id);
    let manager = if actor == user_id {
        gate.effective(actor, &team).await?
    } else {
        gate.check(Some(actor), &team, &Permission::new("team_member", "delete"))
            .await?
    };

    let actor_id = actor.to_string();
    let user = user_id.to_string();
    teams
        .edit_members(
            team_id,
            Box::new(move |members| apply_remove(members, &manager, &actor_id, &user)),
        )
        .await?;
    info!(team_id, user_id, actor, "Removed team member");
    Ok(())
}

/// `DELETE /teams/{tid}`. Refused while the team still owns entities.
pub async fn delete_team(
    gate: &Gate,
    teams: &dyn TeamStore,
    actor: &str,
    team_id: &str,
) -> Result<(), TeamError> {
    gate.check(Some(actor), &team_ref(team_id), &Permission::new("team", "delete"))
        .await?;
    teams.delete_team(team_id).await?;
    info!(team_id, actor, "Deleted team");
    Ok(())
}

/// Source owner of a completed transfer, for audit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: EntityOwner,
    pub to_team: String,
}

/// Move a bot, server or pack into `dst_team`.
///
/// A sole owner needs `{ns}.add` in the destination team. A team-owned
/// entity additionally needs `{ns}.delete` in the source team.
pub async fn transfer_entity(
    gate: &Gate,
    entities: &dyn EntityStore,
    actor: &str,
    target: &EntityRef,
    dst_team: &str,
) -> Result<Transfer, TeamError> {
    if !target.target_type.is_owned() {
        return Err(TeamError::InvalidInput(format!(
            "{} cannot be transferred",
            target.target_type
        )));
    }
    let namespace = target.target_type.namespace();

    let from = entities
        .entity_owner(target)
        .await?
        .ok_or_else(|| TeamError::NotFound(target.to_string()))?;

    match &from {
        EntityOwner::User(owner) if owner == actor => {}
        EntityOwner::User(_) => {
            return Err(TeamError::Forbidden(
                "Only the owner of this entity can transfer it".into(),
            ));
        }
        EntityOwner::Team(src) if src == dst_team => {
            return Err(TeamError::Conflict(format!("{target} is already owned by this team")));
        }
        EntityOwner::Team(_) => {
            gate.check(Some(actor), target, &Permission::new(namespace, "delete"))
                .await?;
        }
    }

    gate.check(Some(actor), &team_ref(dst_team), &Permission::new(namespace, "add"))
        .await?;

    if !entities.set_team_owner(target, dst_team).await? {
        return Err(TeamError::NotFound(target.to_string()));
    }
    info!(target = %target, actor, dst_team, "Transferred entity");

    Ok(Transfer {
        from,
        to_team: dst_team.to_string(),
    })
}

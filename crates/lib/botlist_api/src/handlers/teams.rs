//! Team membership endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use botlist_core::audit::AuditEvent;
use botlist_core::models::TargetType;
use botlist_core::perms::Permission;
use botlist_core::teams;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AddMemberRequest, EditMemberRequest};

fn team_event(state: &AppState, title: &str, actor: &str, team_id: &str) -> AuditEvent {
    AuditEvent::new(title, actor)
        .url(TargetType::Team.audit_url(&state.config.frontend_url, team_id))
        .field("Team", team_id)
}

/// `PUT /teams/{tid}/members` — add a member with the given flags.
pub async fn add_member_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(team_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> AppResult<StatusCode> {
    let flags = Permission::parse_all(&body.flags)?;
    teams::add_member(
        &state.gate,
        state.entities.as_ref(),
        state.teams.as_ref(),
        user.id(),
        &team_id,
        &body.user_id,
        flags,
    )
    .await?;

    state
        .audit
        .emit(
            team_event(&state, "Team Member Added", user.id(), &team_id)
                .field("Member", format!("<@{}>", body.user_id))
                .field("Flags", body.flags.join(", ")),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /teams/{tid}/members/{uid}` — replace a member's flags.
pub async fn edit_member_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((team_id, member_id)): Path<(String, String)>,
    Json(body): Json<EditMemberRequest>,
) -> AppResult<StatusCode> {
    let flags = Permission::parse_all(&body.flags)?;
    teams::edit_member(
        &state.gate,
        state.teams.as_ref(),
        user.id(),
        &team_id,
        &member_id,
        flags,
    )
    .await?;

    state
        .audit
        .emit(
            team_event(&state, "Team Member Edited", user.id(), &team_id)
                .field("Member", format!("<@{member_id}>"))
                .field("Flags", body.flags.join(", ")),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /teams/{tid}/members/{uid}` — remove a member, or leave the team.
pub async fn remove_member_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((team_id, member_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    teams::remove_member(
        &state.gate,
        state.teams.as_ref(),
        user.id(),
        &team_id,
        &member_id,
    )
    .await?;

    state
        .audit
        .emit(
            team_event(&state, "Team Member Removed", user.id(), &team_id)
                .field("Member", format!("<@{member_id}>")),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /teams/{tid}` — delete a team that owns nothing.
pub async fn delete_team_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(team_id): Path<String>,
) -> AppResult<StatusCode> {
    teams::delete_team(&state.gate, state.teams.as_ref(), user.id(), &team_id).await?;

    state
        .audit
        .emit(team_event(&state, "Team Deleted", user.id(), &team_id))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

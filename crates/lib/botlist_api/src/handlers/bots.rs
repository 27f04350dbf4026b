//! Bot listing mutations.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use botlist_core::audit::AuditEvent;
use botlist_core::models::{BotSettings, EntityOwner, EntityRef, TargetType};
use botlist_core::perms::Permission;
use botlist_core::teams;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::TransferRequest;

fn bot(id: &str) -> EntityRef {
    EntityRef::new(TargetType::Bot, id)
}

fn owner_label(owner: &EntityOwner) -> String {
    match owner {
        EntityOwner::User(id) => format!("<@{id}>"),
        EntityOwner::Team(id) => format!("team {id}"),
    }
}

/// `PATCH /bots/{id}/settings` — replace the listing settings.
pub async fn update_settings_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(bot_id): Path<String>,
    Json(settings): Json<BotSettings>,
) -> AppResult<StatusCode> {
    let target = bot(&bot_id);
    state
        .gate
        .check(Some(user.id()), &target, &Permission::new("bot", "edit"))
        .await?;

    let fields = settings.invalid_fields();
    if !fields.is_empty() {
        return Err(AppError::invalid_fields(
            format!("Invalid bot settings: {}", fields.join(", ")),
            fields.into_iter().map(String::from).collect(),
        ));
    }

    if !state
        .entities
        .update_bot_settings(&bot_id, &settings)
        .await?
    {
        return Err(AppError::NotFound(target.to_string()));
    }

    state
        .audit
        .emit(
            AuditEvent::new("Bot Updated", user.id())
                .url(TargetType::Bot.audit_url(&state.config.frontend_url, &bot_id))
                .field("Bot", format!("<@{bot_id}>"))
                .field("Short", settings.short),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /bots/{id}` — delete a bot and its webhooks.
pub async fn delete_bot_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(bot_id): Path<String>,
) -> AppResult<StatusCode> {
    let target = bot(&bot_id);
    state
        .gate
        .check(Some(user.id()), &target, &Permission::new("bot", "delete"))
        .await?;

    if !state.entities.delete_entity(&target).await? {
        return Err(AppError::NotFound(target.to_string()));
    }

    state
        .audit
        .emit(AuditEvent::new("Bot Deleted", user.id()).field("Bot", format!("<@{bot_id}>")))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /bots/{id}/team` — move the bot into a team.
pub async fn transfer_bot_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(bot_id): Path<String>,
    Json(body): Json<TransferRequest>,
) -> AppResult<StatusCode> {
    let target = bot(&bot_id);
    let transfer = teams::transfer_entity(
        &state.gate,
        state.entities.as_ref(),
        user.id(),
        &target,
        &body.team_id,
    )
    .await?;

    state
        .audit
        .emit(
            AuditEvent::new("Bot Transferred", user.id())
                .url(TargetType::Bot.audit_url(&state.config.frontend_url, &bot_id))
                .field("Bot", format!("<@{bot_id}>"))
                .field("From", owner_label(&transfer.from))
                .field("To", format!("team {}", transfer.to_team)),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

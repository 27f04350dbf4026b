//! Effective permission lookup.

use axum::Json;
use axum::extract::{Path, State};
use botlist_core::perms;

use crate::AppState;
use crate::error::AppResult;
use crate::handlers::target;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::PermsResponse;

/// `GET /users/{uid}/entity/{tt}/{tid}/perms` — effective permissions of
/// `uid` on the entity.
pub async fn get_entity_perms_handler(
    State(state): State<AppState>,
    axum::Extension(_user): axum::Extension<AuthenticatedUser>,
    Path((user_id, target_type, target_id)): Path<(String, String, String)>,
) -> AppResult<Json<PermsResponse>> {
    let target = target(&target_type, &target_id)?;
    let effective = state.gate.effective(&user_id, &target).await?;
    Ok(Json(PermsResponse {
        perms: perms::to_strings(&effective),
    }))
}

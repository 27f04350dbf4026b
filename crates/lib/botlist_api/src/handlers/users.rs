//! User self-service.

use axum::Json;
use axum::extract::{Path, State};
use botlist_core::audit::AuditEvent;
use botlist_core::models::TargetType;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::TokenResponse;

pub const TOKEN_LEN: usize = 128;

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// `PATCH /users/{uid}/token` — replace the caller's API token.
pub async fn rotate_token_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(user_id): Path<String>,
) -> AppResult<Json<TokenResponse>> {
    if user.id() != user_id {
        return Err(AppError::Forbidden(
            "You can only regenerate your own token".into(),
        ));
    }

    let token = generate_token();
    if !state.entities.set_token(&user_id, &token).await? {
        return Err(AppError::NotFound(format!("user {user_id}")));
    }

    state
        .audit
        .emit(
            AuditEvent::new("API Token Regenerated", &user_id)
                .url(TargetType::User.audit_url(&state.config.frontend_url, &user_id)),
        )
        .await;
    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_distinct() {
        let a = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, generate_token());
    }
}

//! Authentication middleware: API token lookup.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;

/// Key used to store the caller's user id in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Resolve an `Authorization` token, if any, to its user and inject
/// `AuthenticatedUser`. Requests without the header pass through untouched;
/// an unknown token is refused.
pub async fn identify(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty());

    if let Some(token) = token {
        let user_id = state
            .entities
            .user_by_token(&token)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("Invalid API token".into()))?;
        request.extensions_mut().insert(AuthenticatedUser(user_id));
    }

    Ok(next.run(request).await)
}

/// Axum middleware: refuse requests that `identify` did not authenticate.
pub async fn require_auth(request: Request, next: Next) -> Result<Response, AppError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(AppError::Unauthenticated(
            "Missing authorization header".into(),
        ));
    }
    Ok(next.run(request).await)
}

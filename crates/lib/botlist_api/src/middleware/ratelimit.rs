//! Global rate-limit middleware and the per-route helper.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use botlist_core::ratelimit::{self, Bucket, Limit};

use crate::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;

/// Rate-limit identity of a request: the authenticated user, else the first
/// `X-Forwarded-For` hop.
pub fn identity(user: Option<&AuthenticatedUser>, headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    ratelimit::identity(user.map(AuthenticatedUser::id), forwarded)
}

/// Count the request against the default global bucket and attach the
/// rate-limit headers to the response.
pub async fn global_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let who = identity(
        request.extensions().get::<AuthenticatedUser>(),
        request.headers(),
    );
    let limit = state.limiter.hit(&who, &state.limiter.global_bucket()).await?;
    if limit.exceeded {
        return Err(AppError::RateLimited(limit));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in limit_headers(&limit) {
        if let Some(name) = name {
            // Headers of a route bucket set by the handler win.
            headers.entry(name).or_insert(value);
        }
    }
    Ok(response)
}

/// Count a call against a route bucket, refusing it when exceeded.
pub async fn check_route(
    state: &AppState,
    user: &AuthenticatedUser,
    bucket: &Bucket,
) -> Result<Limit, AppError> {
    let limit = state
        .limiter
        .hit(&ratelimit::identity(Some(user.id()), None), bucket)
        .await?;
    if limit.exceeded {
        return Err(AppError::RateLimited(limit));
    }
    Ok(limit)
}

/// Response headers describing `limit`.
pub fn limit_headers(limit: &Limit) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in limit.headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

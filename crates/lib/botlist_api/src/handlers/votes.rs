//! Vote casting, eligibility and credit redemption.

use std::time::Duration;

use axum::Json;
use axum::http::HeaderMap;
use axum::extract::{Path, Query, State};
use botlist_core::ratelimit::Bucket;
use botlist_core::votes;
use chrono::Utc;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::handlers::{perm, target};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::ratelimit::{check_route, limit_headers};
use crate::models::{
    EligibilityResponse, RedeemResponse, VoteLogsResponse, VoteQuery, VoteResponse,
};

const REDEEM_VOTE_CREDITS: &str = "redeem_vote_credits";

fn vote_bucket() -> Bucket {
    Bucket::route("create_vote", 5, Duration::from_secs(60))
}

/// `PUT /users/{uid}/{tt}/{tid}/votes` — cast a vote as `uid`.
pub async fn create_vote_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((user_id, target_type, target_id)): Path<(String, String, String)>,
    Query(query): Query<VoteQuery>,
) -> AppResult<(HeaderMap, Json<VoteResponse>)> {
    if user.id() != user_id {
        return Err(AppError::Forbidden("You can only vote as yourself".into()));
    }
    let limit = check_route(&state, &user, &vote_bucket()).await?;

    let target = target(&target_type, &target_id)?;
    let cast = votes::create_vote(
        state.votes.as_ref(),
        &state.dispatcher,
        &state.config.votes,
        &user_id,
        &target,
        query.upvote.unwrap_or(true),
        Utc::now(),
    )
    .await?;

    Ok((
        limit_headers(&limit),
        Json(VoteResponse {
            id: cast.vote.id,
            votes: cast.votes,
            webhooks: cast.webhooks,
        }),
    ))
}

/// `GET /users/{uid}/{tt}/{tid}/votes` — whether `uid` may vote now.
pub async fn get_eligibility_handler(
    State(state): State<AppState>,
    axum::Extension(_user): axum::Extension<AuthenticatedUser>,
    Path((user_id, target_type, target_id)): Path<(String, String, String)>,
) -> AppResult<Json<EligibilityResponse>> {
    let target = target(&target_type, &target_id)?;
    let eligibility = votes::eligibility(
        state.votes.as_ref(),
        &state.config.votes,
        &user_id,
        &target,
        Utc::now(),
    )
    .await?;

    Ok(Json(EligibilityResponse {
        can_vote: eligibility.can_vote,
        last_vote: eligibility.last_vote.map(|t| t.to_rfc3339()),
        next_vote_at: eligibility.next_vote_at.map(|t| t.to_rfc3339()),
        window_secs: eligibility.window.num_seconds(),
    }))
}

/// `POST /votes/{tt}/{tid}/redeem` — collapse unredeemed votes into credits.
pub async fn redeem_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(String, String)>,
) -> AppResult<Json<RedeemResponse>> {
    let target = target(&target_type, &target_id)?;
    state
        .gate
        .check(Some(user.id()), &target, &perm(&target, REDEEM_VOTE_CREDITS))
        .await?;
    let credits = votes::redeem(state.votes.as_ref(), &target).await?;
    Ok(Json(RedeemResponse { credits }))
}

/// `GET /votes/{tt}/{tid}/logs` — vote deliveries counted per outcome.
pub async fn vote_logs_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(String, String)>,
) -> AppResult<Json<VoteLogsResponse>> {
    let target = target(&target_type, &target_id)?;
    state
        .gate
        .check(Some(user.id()), &target, &perm(&target, REDEEM_VOTE_CREDITS))
        .await?;
    let outcomes = votes::delivery_summary(state.webhooks.store().as_ref(), &target).await?;
    Ok(Json(VoteLogsResponse { outcomes }))
}

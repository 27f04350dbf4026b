//! Webhook registry endpoints and the test delivery.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use botlist_core::audit::AuditEvent;
use botlist_core::models::{EntityRef, TargetType, Webhook};
use botlist_core::store::DELIVERY_LOG_PAGE_SIZE;
use botlist_core::uuid::uuidv7;
use botlist_core::webhooks::{Event, WebhookInput};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::handlers::{perm, target};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ClearWebhooksResponse, DeliveryLogResponse, PageQuery, TestWebhookRequest,
    TestWebhookResponse, WebhookListResponse, WebhookRequest, WebhookResponse,
};

const GET_WEBHOOKS: &str = "get_webhooks";
const CREATE_WEBHOOKS: &str = "create_webhooks";

async fn authorize(
    state: &AppState,
    user: &AuthenticatedUser,
    target_type: &str,
    target_id: &str,
    action: &str,
) -> AppResult<EntityRef> {
    let target = target(target_type, target_id)?;
    state
        .gate
        .check(Some(user.id()), &target, &perm(&target, action))
        .await?;
    Ok(target)
}

fn webhook_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::invalid_fields("Invalid webhook id", vec!["webhook_id".into()]))
}

/// `GET /webhooks/{tt}/{tid}` — list the entity's webhooks.
pub async fn list_webhooks_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(String, String)>,
) -> AppResult<Json<WebhookListResponse>> {
    let target = authorize(&state, &user, &target_type, &target_id, GET_WEBHOOKS).await?;
    let webhooks = state.webhooks.list(&target).await?;
    Ok(Json(WebhookListResponse {
        webhooks: webhooks.into_iter().map(WebhookResponse::from).collect(),
    }))
}

/// `PATCH /webhooks/{tt}/{tid}` — create or replace a webhook.
pub async fn upsert_webhook_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(String, String)>,
    Json(body): Json<WebhookRequest>,
) -> AppResult<Json<WebhookResponse>> {
    let target = authorize(&state, &user, &target_type, &target_id, CREATE_WEBHOOKS).await?;
    let (id, input) = body.into_input();
    let webhook = state.webhooks.upsert(&target, id, input).await?;

    state
        .audit
        .emit(
            AuditEvent::new("Webhook Updated", user.id())
                .url(target.target_type.audit_url(&state.config.frontend_url, &target.id))
                .field("Target", target.to_string())
                .field("Webhook", webhook.id.to_string())
                .field("URL", webhook.url.clone()),
        )
        .await;
    Ok(Json(webhook.into()))
}

/// `DELETE /webhooks/{tt}/{tid}` — remove every webhook of the entity.
pub async fn clear_webhooks_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(String, String)>,
) -> AppResult<Json<ClearWebhooksResponse>> {
    let target = authorize(&state, &user, &target_type, &target_id, CREATE_WEBHOOKS).await?;
    let removed = state.webhooks.clear(&target).await?;

    state
        .audit
        .emit(
            AuditEvent::new("Webhooks Cleared", user.id())
                .field("Target", target.to_string())
                .field("Removed", removed.to_string()),
        )
        .await;
    Ok(Json(ClearWebhooksResponse { removed }))
}

/// `GET /webhooks/{tt}/{tid}/{wid}` — fetch one webhook.
pub async fn get_webhook_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id, wid)): Path<(String, String, String)>,
) -> AppResult<Json<WebhookResponse>> {
    let target = authorize(&state, &user, &target_type, &target_id, GET_WEBHOOKS).await?;
    let webhook = state.webhooks.get(&target, webhook_id(&wid)?).await?;
    Ok(Json(webhook.into()))
}

/// `DELETE /webhooks/{tt}/{tid}/{wid}` — delete one webhook.
pub async fn delete_webhook_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id, wid)): Path<(String, String, String)>,
) -> AppResult<StatusCode> {
    let target = authorize(&state, &user, &target_type, &target_id, CREATE_WEBHOOKS).await?;
    let id = webhook_id(&wid)?;
    state.webhooks.delete(&target, id).await?;

    state
        .audit
        .emit(
            AuditEvent::new("Webhook Deleted", user.id())
                .field("Target", target.to_string())
                .field("Webhook", id.to_string()),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /webhooks/{tt}/{tid}/logs?page=N` — delivery log, newest first.
pub async fn webhook_logs_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<DeliveryLogResponse>> {
    let target = authorize(&state, &user, &target_type, &target_id, GET_WEBHOOKS).await?;
    let page = query.page.unwrap_or(1).max(1);
    let (entries, total) = state.webhooks.store().delivery_log(&target, page).await?;
    Ok(Json(DeliveryLogResponse {
        entries,
        total,
        page,
        per_page: DELIVERY_LOG_PAGE_SIZE,
    }))
}

/// `POST /webhooks/test` — sign and send one test vote, waiting for the result.
///
/// Nothing is stored and the delivery log is not written.
pub async fn test_webhook_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<TestWebhookRequest>,
) -> AppResult<Json<TestWebhookResponse>> {
    let input = WebhookInput {
        name: "test".into(),
        url: body.url,
        secret: body.secret,
        simple_auth: body.simple_auth,
        event_whitelist: Vec::new(),
    };
    let fields = input.invalid_fields(state.webhooks.policy());
    if !fields.is_empty() {
        return Err(AppError::invalid_fields(
            format!("Invalid webhook fields: {}", fields.join(", ")),
            fields,
        ));
    }

    let target = EntityRef::new(TargetType::Bot, body.bot_id);
    let webhook = Webhook {
        id: uuidv7(),
        target: target.clone(),
        name: input.name,
        url: input.url,
        secret: input.secret,
        broken: false,
        simple_auth: input.simple_auth,
        event_whitelist: input.event_whitelist,
        created_at: Utc::now(),
    };
    let event = Event::test_vote(target, body.votes, &body.user_id);
    let outcome = state.dispatcher.send_once(&webhook, &event).await?;

    info!(
        actor = user.id(),
        url = %webhook.url,
        success = outcome.is_success(),
        "Test webhook sent"
    );
    Ok(Json(outcome.into()))
}

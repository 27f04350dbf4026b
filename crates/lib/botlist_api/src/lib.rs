//! # botlist_api
//!
//! HTTP API library for Botlist.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use botlist_core::audit::AuditSink;
use botlist_core::authz::Gate;
use botlist_core::ratelimit::RateLimiter;
use botlist_core::store::{EntityStore, TeamStore, VoteStore, WebhookStore};
use botlist_core::webhooks::{Dispatcher, Registry};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{bots, health, perms, teams, users, votes, webhooks};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub pool: PgPool,
    pub entities: Arc<dyn EntityStore>,
    pub teams: Arc<dyn TeamStore>,
    pub votes: Arc<dyn VoteStore>,
    pub webhooks: Registry,
    pub gate: Gate,
    pub limiter: RateLimiter,
    pub dispatcher: Dispatcher,
    pub audit: Arc<dyn AuditSink>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire every store seam to one backend.
    pub fn new<S>(
        pool: PgPool,
        store: Arc<S>,
        limiter: RateLimiter,
        dispatcher: Dispatcher,
        audit: Arc<dyn AuditSink>,
        config: ApiConfig,
    ) -> Self
    where
        S: EntityStore + TeamStore + VoteStore + WebhookStore + 'static,
    {
        Self {
            pool,
            entities: store.clone(),
            teams: store.clone(),
            votes: store.clone(),
            webhooks: Registry::new(store.clone(), config.signing.clone()),
            gate: Gate::new(store),
            limiter,
            dispatcher,
            audit,
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `botlist_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    botlist_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new().route(routes::GET_HEALTHZ, get(health::healthz));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_ENTITY_PERMS, get(perms::get_entity_perms_handler))
        .route(routes::PATCH_USER_TOKEN, patch(users::rotate_token_handler))
        .route(
            routes::BOT_SETTINGS,
            patch(bots::update_settings_handler),
        )
        .route(routes::BOT, axum::routing::delete(bots::delete_bot_handler))
        .route(routes::BOT_TEAM, patch(bots::transfer_bot_handler))
        .route(routes::PUT_TEAM_MEMBERS, put(teams::add_member_handler))
        .route(
            routes::TEAM_MEMBER,
            patch(teams::edit_member_handler).delete(teams::remove_member_handler),
        )
        .route(routes::TEAM, axum::routing::delete(teams::delete_team_handler))
        .route(
            routes::WEBHOOKS,
            get(webhooks::list_webhooks_handler)
                .patch(webhooks::upsert_webhook_handler)
                .delete(webhooks::clear_webhooks_handler),
        )
        .route(
            routes::WEBHOOK,
            get(webhooks::get_webhook_handler).delete(webhooks::delete_webhook_handler),
        )
        .route(routes::GET_WEBHOOK_LOGS, get(webhooks::webhook_logs_handler))
        .route(routes::POST_WEBHOOK_TEST, post(webhooks::test_webhook_handler))
        .route(
            routes::USER_VOTES,
            get(votes::get_eligibility_handler).put(votes::create_vote_handler),
        )
        .route(routes::POST_VOTE_REDEEM, post(votes::redeem_handler))
        .route(routes::GET_VOTE_LOGS, get(votes::vote_logs_handler))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth));

    // Layers run bottom-up: identify, then count the request globally.
    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::ratelimit::global_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::identify,
        ))
        .layer(cors)
        .with_state(state)
}

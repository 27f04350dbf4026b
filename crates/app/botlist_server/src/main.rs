//! Botlist API server binary.
//!
//! Serves the HTTP API and runs the webhook dispatcher, the vote reminder
//! loop and delivery log retention until interrupted.

use std::sync::Arc;
use std::time::Duration;

use botlist_api::{AppState, config::ApiConfig};
use botlist_core::audit::{AuditSink, ModLogSink, TracingSink};
use botlist_core::ratelimit::{CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore};
use botlist_core::reminders::ReminderLoop;
use botlist_core::store::{PgStore, schema};
use botlist_core::webhooks::{Dispatcher, retention};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "botlist_server", about = "Botlist API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/botlist"
    )]
    database_url: String,

    /// Redis URL for rate-limit counters. Counters stay in process when unset.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 20)]
    max_connections: u32,

    /// Skip the vote reminder loop, e.g. when another replica runs it.
    #[arg(long, default_value_t = false)]
    no_reminders: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,botlist_api=debug,botlist_core=debug")
            }),
        )
        .init();

    let args = Args::parse();
    let config = ApiConfig {
        bind_addr: args.bind_addr,
        pg_connection_url: args.database_url,
        redis_url: args.redis_url,
        ..ApiConfig::from_env()
    };

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting botlist_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    botlist_api::migrate(&pool).await?;
    schema::verify(&pool).await?;

    let counters: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            info!("using Redis rate-limit counters");
            Arc::new(RedisCounterStore::connect(url).await?)
        }
        None => {
            warn!("REDIS_URL not set, rate-limit counters are per process");
            Arc::new(MemoryCounterStore::new())
        }
    };
    let limiter = RateLimiter::new(counters, config.rate_limit.clone());

    let store = Arc::new(PgStore::new(pool.clone()));
    let dispatcher = Dispatcher::new(store.clone(), config.dispatcher.clone())?;

    let audit: Arc<dyn AuditSink> = match &config.mod_log_webhook {
        Some(url) => Arc::new(ModLogSink::new(reqwest::Client::new(), url.clone())),
        None => Arc::new(TracingSink),
    };

    let cancel = CancellationToken::new();
    let mut background = Vec::new();
    if !args.no_reminders {
        let reminders = ReminderLoop::new(
            store.clone(),
            store.clone(),
            dispatcher.clone(),
            config.reminders.clone(),
            config.votes.clone(),
            config.frontend_url.clone(),
        );
        background.push(tokio::spawn(reminders.run(cancel.clone())));
    }
    background.push(tokio::spawn(retention::run(
        store.clone(),
        config.dispatcher.clone(),
        cancel.clone(),
    )));

    let grace = config.dispatcher.shutdown_grace;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, store, limiter, dispatcher.clone(), audit, config);
    let app = botlist_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cancel.cancel();
    for task in background {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {e}");
        }
    }
    dispatcher.shutdown(grace).await;
    info!("botlist_server stopped");

    result?;
    Ok(())
}

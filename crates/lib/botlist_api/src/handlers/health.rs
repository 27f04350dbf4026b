//! Liveness endpoint.

use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::AppState;
use crate::error::AppResult;
use crate::models::HealthResponse;

/// `GET /healthz` — reports whether PostgreSQL answers.
pub async fn healthz(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_connected = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check query failed: {e}");
            false
        }
    };
    let status = if db_connected { "ok" } else { "degraded" };
    Ok(Json(HealthResponse {
        status: status.into(),
        db_connected,
    }))
}

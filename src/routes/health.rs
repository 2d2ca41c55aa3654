use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::state::AppState;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Liveness plus a bounded database ping. Reports `degraded` instead of
/// erroring so load balancers keep routing while the pool recovers.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match &state.db_pool {
        Some(pool) => ping_database(pool).await,
        // No DATABASE_URL configured; nothing to ping.
        None => true,
    };

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "service": state.config.app_name.as_str(),
        "database": database,
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn ping_database(pool: &PgPool) -> bool {
    match tokio::time::timeout(DB_PING_TIMEOUT, sqlx::query("SELECT 1").fetch_one(pool)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Health check database ping failed");
            false
        }
        Err(_) => {
            tracing::error!("Health check database ping timed out");
            false
        }
    }
}

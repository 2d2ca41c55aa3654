use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::schemas::InitiateRentInput;
use crate::services::rent;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/rent/initiate", axum::routing::post(initiate_rent))
        .route("/rent/history", axum::routing::get(rent_history))
}

async fn initiate_rent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InitiateRentInput>,
) -> AppResult<Json<Value>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let initiated = rent::initiate_rent(
        pool,
        &state.paystack,
        &state.config.frontend_url,
        user_id,
        payload.unit_id,
        payload.amount,
        payload.duration_value,
        payload.duration_unit,
    )
    .await?;

    Ok(Json(json!({
        "url": initiated.url,
        "reference": initiated.reference,
    })))
}

async fn rent_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let history = rent::rent_history(pool, user_id).await?;
    Ok(Json(serde_json::to_value(history).unwrap_or(Value::Null)))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult};
use crate::schemas::{PurchaseUtilityInput, VerifyMeterInput};
use crate::services::utility;
use crate::state::AppState;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/utilities/verify-meter",
            axum::routing::post(verify_meter),
        )
        .route(
            "/utilities/purchase",
            axum::routing::post(initiate_purchase),
        )
}

async fn verify_meter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyMeterInput>,
) -> AppResult<Json<Value>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let _user_id = require_user_id(&state, &headers)?;

    let customer = utility::verify_meter(
        &state.vtpass,
        &payload.service_id,
        &payload.meter_number,
        payload.variation_type.as_deref(),
    )
    .await?;

    Ok(Json(json!({
        "customerName": customer.customer_name,
        "address": customer.address,
        "valid": true,
    })))
}

async fn initiate_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PurchaseUtilityInput>,
) -> AppResult<Json<Value>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let initiated = utility::initiate_purchase(
        pool,
        &state.paystack,
        &state.config.frontend_url,
        user_id,
        payload.service_id,
        payload.meter_number,
        payload.variation_type,
        payload.amount,
    )
    .await?;

    Ok(Json(json!({
        "url": initiated.url,
        "reference": initiated.reference,
    })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

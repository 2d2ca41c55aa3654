use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Resolve the authenticated caller's user id from the `Authorization`
/// bearer token (HS256). In non-production, an `x-user-id` header may stand
/// in when dev overrides are enabled.
pub fn require_user_id(state: &AppState, headers: &HeaderMap) -> AppResult<Uuid> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(raw) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
            return raw
                .trim()
                .parse()
                .map_err(|_| AppError::Unauthorized("Invalid x-user-id header.".to_string()));
        }
    }

    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::Dependency("JWT_SECRET is not configured.".to_string()))?;

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".to_string()))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token.".to_string()))?;

    data.claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Token subject is not a user id.".to_string()))
}

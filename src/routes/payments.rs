use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use validator::Validate;

use crate::auth::require_user_id;
use crate::error::{AppError, AppResult, SettlementError};
use crate::schemas::VerifyPaymentInput;
use crate::state::AppState;

type HmacSha512 = Hmac<Sha512>;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/payments/verify", axum::routing::post(verify_payment))
        .route("/webhooks/paystack", axum::routing::post(paystack_webhook))
}

/// Universal settlement endpoint for rent and utilities, called by the
/// frontend after the gateway redirect.
async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyPaymentInput>,
) -> AppResult<Json<Value>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = require_user_id(&state, &headers)?;
    let pool = db_pool(&state)?;

    let outcome = state
        .settlement
        .settle(pool, payload.reference.trim())
        .await?;

    tracing::info!(
        reference = %payload.reference.trim(),
        %user_id,
        requires_attention = outcome.requires_attention,
        "Payment verified"
    );
    Ok(Json(serde_json::to_value(outcome).unwrap_or(Value::Null)))
}

/// Gateway webhook. Signature-checked against the raw body; only
/// `charge.success` triggers settlement. Paystack redelivers on non-2xx, so
/// terminal failures are acknowledged with 200 and only a retryable upstream
/// outage returns 503.
async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let secret = state
        .config
        .paystack_secret_key
        .as_deref()
        .ok_or_else(|| AppError::Dependency("PAYSTACK_SECRET_KEY not configured.".to_string()))?;

    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_paystack_signature(&body, signature, secret) {
        return Err(AppError::Unauthorized("Invalid webhook signature.".to_string()));
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Malformed webhook payload.".to_string()))?;

    let event_type = event.get("event").and_then(Value::as_str).unwrap_or_default();
    if event_type != "charge.success" {
        tracing::debug!(event_type, "Ignoring Paystack event");
        return Ok(StatusCode::OK);
    }

    let reference = event
        .get("data")
        .and_then(|d| d.get("reference"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if reference.is_empty() {
        return Ok(StatusCode::OK);
    }

    let pool = db_pool(&state)?;
    match state.settlement.settle(pool, reference).await {
        Ok(outcome) => {
            tracing::info!(
                reference,
                requires_attention = outcome.requires_attention,
                "Webhook settlement applied"
            );
            Ok(StatusCode::OK)
        }
        // Let the gateway redeliver when we could not reach a dependency.
        Err(SettlementError::UpstreamUnavailable(which)) => {
            tracing::warn!(reference, which, "Webhook settlement deferred, upstream unavailable");
            Err(AppError::Dependency(
                "Upstream unavailable, retry delivery.".to_string(),
            ))
        }
        // Terminal outcomes: redelivery cannot change them.
        Err(e) => {
            tracing::error!(reference, error = %e, "Webhook settlement failed terminally");
            Ok(StatusCode::OK)
        }
    }
}

/// Paystack signs the raw body with HMAC-SHA512 under the secret key.
/// Constant-time comparison via `verify_slice`.
fn verify_paystack_signature(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let Ok(expected) = hex_decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"event":"charge.success","data":{"reference":"RENT-1"}}"#;
        let signature = sign(payload, "sk_test_secret");
        assert!(verify_paystack_signature(payload, &signature, "sk_test_secret"));
    }

    #[test]
    fn rejects_wrong_secret_and_tampered_body() {
        let payload = br#"{"event":"charge.success"}"#;
        let signature = sign(payload, "sk_test_secret");
        assert!(!verify_paystack_signature(payload, &signature, "other_secret"));
        assert!(!verify_paystack_signature(b"{}", &signature, "sk_test_secret"));
    }

    #[test]
    fn rejects_garbage_signatures() {
        assert!(!verify_paystack_signature(b"{}", "", "secret"));
        assert!(!verify_paystack_signature(b"{}", "zz", "secret"));
        assert!(!verify_paystack_signature(b"{}", "abc", "secret"));
    }
}

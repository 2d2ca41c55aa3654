use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::SettlementError;

const UPSTREAM_NAME: &str = "the payment provider";

/// What the gateway reported for a reference. A declared non-settlement is a
/// normal result, not an error — only network-level failures are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVerification {
    pub settled: bool,
    pub raw_status: String,
    /// Settled amount in minor units, when the gateway reports one.
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
}

#[async_trait]
pub trait GatewayVerifier: Send + Sync {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, SettlementError>;
}

/// Live Paystack client. Constructed once at startup and injected into the
/// reconciliation engine; tests substitute a fake behind the same trait.
pub struct PaystackGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    pub fn new(client: Client, base_url: String, secret_key: String) -> Self {
        Self {
            client,
            base_url,
            secret_key,
        }
    }

    /// Initialize a transaction and return the checkout `authorization_url`.
    /// Used by the initiation flows, not by settlement.
    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
        callback_url: &str,
    ) -> Result<String, SettlementError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "email": email,
                "amount": amount_minor,
                "reference": reference,
                "callback_url": callback_url,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, reference, "Paystack initialize request failed");
                SettlementError::UpstreamUnavailable(UPSTREAM_NAME)
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|_| SettlementError::UpstreamUnavailable(UPSTREAM_NAME))?;

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Paystack error");
            tracing::error!(%status, message, reference, "Paystack initialize rejected");
            return Err(SettlementError::UpstreamUnavailable(UPSTREAM_NAME));
        }

        body.get("data")
            .and_then(|d| d.get("authorization_url"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or(SettlementError::UpstreamUnavailable(UPSTREAM_NAME))
    }
}

#[async_trait]
impl GatewayVerifier for PaystackGateway {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, SettlementError> {
        let response = self
            .client
            .get(format!(
                "{}/transaction/verify/{reference}",
                self.base_url
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, reference, "Paystack verify request failed");
                SettlementError::UpstreamUnavailable(UPSTREAM_NAME)
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|_| SettlementError::UpstreamUnavailable(UPSTREAM_NAME))?;

        verification_from_response(reference, status, &body)
    }
}

/// A non-2xx verify reply (bad key, gateway outage) says nothing about the
/// payment itself, so it must surface as an upstream failure the caller can
/// retry — never as a declared non-settlement, which would terminally fail
/// the payment.
fn verification_from_response(
    reference: &str,
    status: reqwest::StatusCode,
    body: &Value,
) -> Result<GatewayVerification, SettlementError> {
    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Paystack error");
        tracing::error!(%status, message, reference, "Paystack verify rejected");
        return Err(SettlementError::UpstreamUnavailable(UPSTREAM_NAME));
    }

    Ok(parse_verification(body))
}

/// `data.status == "success"` is the sole settlement signal; everything else
/// ("failed", "abandoned", missing) is a declared non-settlement.
fn parse_verification(body: &Value) -> GatewayVerification {
    let data = body.get("data");
    let raw_status = data
        .and_then(|d| d.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    GatewayVerification {
        settled: raw_status == "success",
        amount_minor: data.and_then(|d| d.get("amount")).and_then(Value::as_i64),
        currency: data
            .and_then(|d| d.get("currency"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        raw_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_settled_response() {
        let body = json!({
            "status": true,
            "data": { "status": "success", "amount": 450000, "currency": "NGN" }
        });
        let parsed = parse_verification(&body);
        assert!(parsed.settled);
        assert_eq!(parsed.amount_minor, Some(450000));
        assert_eq!(parsed.currency.as_deref(), Some("NGN"));
    }

    #[test]
    fn abandoned_transaction_is_not_settled() {
        let body = json!({
            "status": true,
            "data": { "status": "abandoned", "amount": 450000 }
        });
        let parsed = parse_verification(&body);
        assert!(!parsed.settled);
        assert_eq!(parsed.raw_status, "abandoned");
    }

    #[test]
    fn malformed_response_is_not_settled() {
        let parsed = parse_verification(&json!({ "status": false }));
        assert!(!parsed.settled);
        assert_eq!(parsed.raw_status, "unknown");
        assert_eq!(parsed.amount_minor, None);
    }

    #[test]
    fn gateway_error_status_is_upstream_unavailable() {
        // A 5xx or auth failure must not look like a declined payment: the
        // reference may well be settled on the gateway's side.
        let outage = json!({ "status": false, "message": "Internal server error" });
        for status in [
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            reqwest::StatusCode::UNAUTHORIZED,
            reqwest::StatusCode::NOT_FOUND,
        ] {
            assert!(matches!(
                verification_from_response("RENT-abcde-1", status, &outage),
                Err(SettlementError::UpstreamUnavailable(_))
            ));
        }
    }

    #[test]
    fn success_status_parses_the_verification() {
        let body = json!({
            "status": true,
            "data": { "status": "success", "amount": 450000, "currency": "NGN" }
        });
        let parsed =
            verification_from_response("RENT-abcde-1", reqwest::StatusCode::OK, &body)
                .expect("2xx verify");
        assert!(parsed.settled);

        let declined = json!({
            "status": true,
            "data": { "status": "failed", "amount": 450000 }
        });
        let parsed =
            verification_from_response("RENT-abcde-1", reqwest::StatusCode::OK, &declined)
                .expect("2xx verify");
        assert!(!parsed.settled);
        assert_eq!(parsed.raw_status, "failed");
    }
}

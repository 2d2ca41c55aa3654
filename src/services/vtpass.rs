use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::SettlementError;

const UPSTREAM_NAME: &str = "the vending provider";

/// VTPass success code.
const CODE_OK: &str = "000";

#[derive(Debug, Clone, PartialEq)]
pub struct VendReceipt {
    pub token: String,
    pub provider_txn_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterCustomer {
    pub customer_name: String,
    pub address: Option<String>,
}

#[async_trait]
pub trait VendingClient: Send + Sync {
    /// Purchase a prepaid token. `idempotency_key` is the payment reference,
    /// forwarded as the provider's `request_id` so a retried call after a
    /// network timeout does not double-vend.
    async fn purchase(
        &self,
        idempotency_key: &str,
        service_id: &str,
        meter_number: &str,
        variation_type: Option<&str>,
        amount_minor: i64,
        phone: &str,
    ) -> Result<VendReceipt, SettlementError>;
}

pub struct VtPassClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl VtPassClient {
    pub fn new(client: Client, base_url: String, api_key: String, secret_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            secret_key,
        }
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, SettlementError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("api-key", &self.api_key)
            .header("secret-key", &self.secret_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path, "VTPass request failed");
                SettlementError::UpstreamUnavailable(UPSTREAM_NAME)
            })?;

        response
            .json()
            .await
            .map_err(|_| SettlementError::UpstreamUnavailable(UPSTREAM_NAME))
    }

    /// Check who owns a meter before taking money for it.
    pub async fn verify_meter(
        &self,
        service_id: &str,
        meter_number: &str,
        variation_type: Option<&str>,
    ) -> Result<MeterCustomer, SettlementError> {
        let mut payload = json!({
            "serviceID": service_id,
            "billersCode": meter_number,
        });
        if let Some(vt) = variation_type {
            payload["type"] = Value::String(vt.to_string());
        }

        let body = self.post("/merchant-verify", &payload).await?;
        parse_meter_customer(&body)
    }
}

#[async_trait]
impl VendingClient for VtPassClient {
    async fn purchase(
        &self,
        idempotency_key: &str,
        service_id: &str,
        meter_number: &str,
        variation_type: Option<&str>,
        amount_minor: i64,
        phone: &str,
    ) -> Result<VendReceipt, SettlementError> {
        let mut payload = json!({
            "request_id": idempotency_key,
            "serviceID": service_id,
            "billersCode": meter_number,
            // VTPass bills in major units.
            "amount": amount_minor / 100,
            "phone": phone,
        });
        if let Some(vt) = variation_type {
            payload["variation_code"] = Value::String(vt.to_string());
        }

        let body = self.post("/pay", &payload).await?;
        parse_receipt(&body)
    }
}

fn parse_meter_customer(body: &Value) -> Result<MeterCustomer, SettlementError> {
    if body.get("code").and_then(Value::as_str) != Some(CODE_OK) {
        let reason = response_description(body);
        return Err(SettlementError::VendingFailed(reason));
    }

    let content = body.get("content");
    let customer_name = content
        .and_then(|c| c.get("Customer_Name"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| SettlementError::VendingFailed("Invalid meter number".to_string()))?;

    Ok(MeterCustomer {
        customer_name,
        address: content
            .and_then(|c| c.get("Address"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    })
}

fn parse_receipt(body: &Value) -> Result<VendReceipt, SettlementError> {
    if body.get("code").and_then(Value::as_str) != Some(CODE_OK) {
        return Err(SettlementError::VendingFailed(response_description(body)));
    }

    let token = extract_token(body)
        .ok_or_else(|| SettlementError::VendingFailed("No token in provider response".to_string()))?;

    Ok(VendReceipt {
        token,
        provider_txn_id: body
            .get("content")
            .and_then(|c| c.get("transactions"))
            .and_then(|t| t.get("transactionId"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    })
}

/// Different services return the token under different keys; normalize.
fn extract_token(body: &Value) -> Option<String> {
    ["mainToken", "purchased_code", "token"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
}

fn response_description(body: &Value) -> String {
    body.get("response_description")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Vending failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_receipt_with_main_token() {
        let body = json!({
            "code": "000",
            "mainToken": "1234-5678-9012",
            "content": { "transactions": { "transactionId": "17001" } }
        });
        let receipt = parse_receipt(&body).expect("successful vend");
        assert_eq!(receipt.token, "1234-5678-9012");
        assert_eq!(receipt.provider_txn_id.as_deref(), Some("17001"));
    }

    #[test]
    fn token_key_falls_back_in_provider_order() {
        let body = json!({ "purchased_code": "Token: 9999", "token": "ignored" });
        assert_eq!(extract_token(&body).as_deref(), Some("Token: 9999"));
        let body = json!({ "token": "only-this" });
        assert_eq!(extract_token(&body).as_deref(), Some("only-this"));
    }

    #[test]
    fn non_success_code_is_vending_failed() {
        let body = json!({
            "code": "016",
            "response_description": "TRANSACTION FAILED"
        });
        match parse_receipt(&body) {
            Err(SettlementError::VendingFailed(reason)) => {
                assert_eq!(reason, "TRANSACTION FAILED");
            }
            other => panic!("expected VendingFailed, got {other:?}"),
        }
    }

    #[test]
    fn success_code_without_token_is_vending_failed() {
        let body = json!({ "code": "000" });
        assert!(matches!(
            parse_receipt(&body),
            Err(SettlementError::VendingFailed(_))
        ));
    }

    #[test]
    fn parses_meter_customer() {
        let body = json!({
            "code": "000",
            "content": { "Customer_Name": "John Doe", "Address": "12 Allen Ave" }
        });
        let customer = parse_meter_customer(&body).expect("valid meter");
        assert_eq!(customer.customer_name, "John Doe");
        assert_eq!(customer.address.as_deref(), Some("12 Allen Ave"));
    }
}

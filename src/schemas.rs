use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::DurationUnit;

fn default_duration_value() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentInput {
    #[validate(length(min = 1, message = "Reference is required"))]
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRentInput {
    /// Present for a move-in, absent for a renewal of the current lease.
    pub unit_id: Option<Uuid>,
    /// Minor currency units (kobo).
    #[validate(range(min = 1, message = "Amount must be greater than zero"))]
    pub amount: i64,
    #[serde(default = "default_duration_value")]
    #[validate(range(min = 1, max = 10))]
    pub duration_value: u32,
    #[serde(default)]
    pub duration_unit: DurationUnit,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseUtilityInput {
    #[serde(rename = "serviceID")]
    #[validate(length(min = 1, message = "serviceID is required"))]
    pub service_id: String,
    #[validate(length(min = 1, message = "Meter number is required"))]
    pub meter_number: String,
    /// Prepaid vs postpaid, where the biller distinguishes.
    #[serde(rename = "type")]
    pub variation_type: Option<String>,
    /// Minor currency units (kobo).
    #[validate(range(min = 1, message = "Amount must be greater than zero"))]
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMeterInput {
    #[serde(rename = "serviceID")]
    #[validate(length(min = 1, message = "serviceID is required"))]
    pub service_id: String,
    #[validate(length(min = 1, message = "Meter number is required"))]
    pub meter_number: String,
    #[serde(rename = "type")]
    pub variation_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use validator::Validate;

    #[test]
    fn rejects_non_positive_amounts() {
        let input: InitiateRentInput =
            serde_json::from_value(json!({ "amount": 0 })).expect("deserializes");
        assert!(input.validate().is_err());

        let input: PurchaseUtilityInput = serde_json::from_value(json!({
            "serviceID": "ikeja-electric",
            "meterNumber": "1111",
            "amount": -5,
        }))
        .expect("deserializes");
        assert!(input.validate().is_err());
    }

    #[test]
    fn rent_input_defaults_to_one_year_renewal() {
        let input: InitiateRentInput =
            serde_json::from_value(json!({ "amount": 450000 })).expect("deserializes");
        assert!(input.unit_id.is_none());
        assert_eq!(input.duration_value, 1);
        assert_eq!(input.duration_unit, DurationUnit::Year);
        assert!(input.validate().is_ok());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Rent,
    UtilityToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Available,
    Occupied,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStatus {
    Active,
    Expired,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationUnit {
    Year,
    Month,
}

impl Default for DurationUnit {
    fn default() -> Self {
        Self::Year
    }
}

fn default_duration_value() -> u32 {
    1
}

/// The intent recorded on a payment at initiation time, stored in
/// `payments.metadata` and replayed at settlement. The JSON field names match
/// the gateway-facing wire shape (`targetUnitId`, `serviceID`, `type`, …), so
/// rows written by older deployments keep parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum PaymentIntent {
    #[serde(rename = "NEW_LEASE", rename_all = "camelCase")]
    NewLease {
        target_unit_id: Uuid,
        #[serde(default = "default_duration_value")]
        duration_value: u32,
        #[serde(default)]
        duration_unit: DurationUnit,
    },
    #[serde(rename = "RENT_RENEWAL", rename_all = "camelCase")]
    RentRenewal {
        #[serde(default = "default_duration_value")]
        duration_value: u32,
        #[serde(default)]
        duration_unit: DurationUnit,
    },
    #[serde(rename = "UTILITY_PURCHASE", rename_all = "camelCase")]
    UtilityPurchase {
        #[serde(rename = "serviceID")]
        service_id: String,
        meter_number: String,
        /// Prepaid vs postpaid discriminator, required by some billers.
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        variation_type: Option<String>,
        phone: String,
    },
}

/// One row per attempted financial transaction. `reference` is the
/// idempotency key for the whole settlement flow: unique, immutable, and the
/// only correlation handle the gateway ever sends back.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub lease_id: Option<Uuid>,
    /// Minor currency units (kobo).
    pub amount: i64,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub utility_token: Option<String>,
    pub metadata: Value,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Parse the stored metadata into the closed intent set. Extra keys
    /// (vending annotations added at settlement) are ignored.
    pub fn intent(&self) -> Result<PaymentIntent, serde_json::Error> {
        serde_json::from_value(self.metadata.clone())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Unit {
    pub id: Uuid,
    pub property_id: Uuid,
    pub name: String,
    pub status: UnitStatus,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Lease {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub unit_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Minor currency units (kobo).
    pub rent_amount: i64,
    pub status: LeaseStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_new_lease_metadata() {
        let metadata = json!({
            "action": "NEW_LEASE",
            "targetUnitId": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "durationValue": 2,
            "durationUnit": "MONTH",
        });
        let intent: PaymentIntent = serde_json::from_value(metadata).expect("valid metadata");
        match intent {
            PaymentIntent::NewLease {
                duration_value,
                duration_unit,
                ..
            } => {
                assert_eq!(duration_value, 2);
                assert_eq!(duration_unit, DurationUnit::Month);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn renewal_metadata_defaults_to_one_year() {
        let intent: PaymentIntent =
            serde_json::from_value(json!({ "action": "RENT_RENEWAL" })).expect("valid metadata");
        assert_eq!(
            intent,
            PaymentIntent::RentRenewal {
                duration_value: 1,
                duration_unit: DurationUnit::Year,
            }
        );
    }

    #[test]
    fn parses_utility_metadata_with_wire_field_names() {
        let metadata = json!({
            "action": "UTILITY_PURCHASE",
            "serviceID": "ikeja-electric",
            "meterNumber": "1111111111111",
            "type": "prepaid",
            "phone": "08012345678",
        });
        let intent: PaymentIntent = serde_json::from_value(metadata).expect("valid metadata");
        match intent {
            PaymentIntent::UtilityPurchase {
                service_id,
                meter_number,
                variation_type,
                phone,
            } => {
                assert_eq!(service_id, "ikeja-electric");
                assert_eq!(meter_number, "1111111111111");
                assert_eq!(variation_type.as_deref(), Some("prepaid"));
                assert_eq!(phone, "08012345678");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ignores_settlement_annotations_when_reparsing() {
        // Settlement merges vendingStatus/providerTxnId into metadata; a
        // replayed parse must still resolve the original intent.
        let metadata = json!({
            "action": "UTILITY_PURCHASE",
            "serviceID": "abuja-electric",
            "meterNumber": "2222",
            "phone": "08000000000",
            "vendingStatus": "FAILED",
            "vendingError": "TRANSACTION FAILED",
        });
        assert!(serde_json::from_value::<PaymentIntent>(metadata).is_ok());
    }

    #[test]
    fn rejects_unknown_action() {
        let metadata = json!({ "action": "CHARGEBACK" });
        assert!(serde_json::from_value::<PaymentIntent>(metadata).is_err());
    }
}

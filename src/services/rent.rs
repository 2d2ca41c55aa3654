use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{DurationUnit, PaymentIntent, PaymentStatus, PaymentType, UnitStatus};
use crate::services::{leasing, paystack::PaystackGateway, users};

pub struct InitiatedPayment {
    pub url: String,
    pub reference: String,
}

/// Start a rent payment. Decides whether this is a move-in (NEW_LEASE) or an
/// extension (RENT_RENEWAL), records the decision as intent metadata on a
/// PENDING payment, and hands the caller the gateway checkout URL. Settlement
/// replays the metadata later.
#[allow(clippy::too_many_arguments)]
pub async fn initiate_rent(
    pool: &PgPool,
    gateway: &PaystackGateway,
    frontend_url: &str,
    user_id: Uuid,
    unit_id: Option<Uuid>,
    amount_minor: i64,
    duration_value: u32,
    duration_unit: DurationUnit,
) -> AppResult<InitiatedPayment> {
    let (intent, lease_id) = match unit_id {
        // Move-in: the unit must exist and currently be AVAILABLE. This is a
        // pre-check only — the authoritative claim happens at settlement,
        // inside the transaction.
        Some(unit_id) => {
            let unit = leasing::get_unit(pool, unit_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Target unit not found.".to_string()))?;
            if unit.status != UnitStatus::Available {
                return Err(AppError::BadRequest(
                    "This unit is already occupied or under maintenance.".to_string(),
                ));
            }
            (
                PaymentIntent::NewLease {
                    target_unit_id: unit_id,
                    duration_value,
                    duration_unit,
                },
                None,
            )
        }
        // Extension: renew the tenant's current lease, expired or not.
        None => {
            let lease = leasing::find_renewable_lease(pool, user_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(
                        "No existing lease found to renew. Please select a unit to move into."
                            .to_string(),
                    )
                })?;
            (
                PaymentIntent::RentRenewal {
                    duration_value,
                    duration_unit,
                },
                Some(lease.id),
            )
        }
    };

    let user = users::get_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User profile error.".to_string()))?;

    let reference = payment_reference("RENT", user_id);
    let callback_url = format!("{frontend_url}/payment/verify");
    let url = gateway
        .initialize_transaction(&user.email, amount_minor, &reference, &callback_url)
        .await
        .map_err(AppError::from)?;

    insert_pending_payment(
        pool,
        user_id,
        lease_id,
        amount_minor,
        &reference,
        PaymentType::Rent,
        &intent,
    )
    .await?;

    Ok(InitiatedPayment { url, reference })
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentHistoryEntry {
    pub payment_id: Uuid,
    pub amount: i64,
    pub date: chrono::DateTime<Utc>,
    pub status: PaymentStatus,
    pub reference: String,
}

/// The caller's settled rent payments, newest first.
pub async fn rent_history(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<RentHistoryEntry>> {
    let rows: Vec<(Uuid, i64, Option<chrono::DateTime<Utc>>, chrono::DateTime<Utc>, String)> =
        sqlx::query_as(
            "SELECT id, amount, paid_date, created_at, reference FROM payments
              WHERE user_id = $1 AND payment_type = $2 AND status = $3
              ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(PaymentType::Rent)
        .bind(PaymentStatus::Paid)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, amount, paid_date, created_at, reference)| RentHistoryEntry {
            payment_id: id,
            amount,
            date: paid_date.unwrap_or(created_at),
            status: PaymentStatus::Paid,
            reference,
        })
        .collect())
}

pub(crate) fn payment_reference(prefix: &str, user_id: Uuid) -> String {
    let user_part = &user_id.simple().to_string()[..5];
    format!("{prefix}-{user_part}-{}", Utc::now().timestamp_millis())
}

pub(crate) async fn insert_pending_payment(
    pool: &PgPool,
    user_id: Uuid,
    lease_id: Option<Uuid>,
    amount_minor: i64,
    reference: &str,
    payment_type: PaymentType,
    intent: &PaymentIntent,
) -> AppResult<()> {
    let metadata: Value = serde_json::to_value(intent)
        .map_err(|e| AppError::Internal(format!("Could not encode payment metadata: {e}")))?;

    sqlx::query(
        "INSERT INTO payments
            (id, reference, user_id, lease_id, amount, status, payment_type, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(Uuid::new_v4())
    .bind(reference)
    .bind(user_id)
    .bind(lease_id)
    .bind(amount_minor)
    .bind(PaymentStatus::Pending)
    .bind(payment_type)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn references_carry_prefix_and_user_fragment() {
        let user_id = Uuid::new_v4();
        let reference = payment_reference("RENT", user_id);
        assert!(reference.starts_with("RENT-"));
        assert!(reference.contains(&user_id.simple().to_string()[..5]));
    }

    #[test]
    fn new_lease_intent_round_trips_through_metadata() {
        let intent = PaymentIntent::NewLease {
            target_unit_id: Uuid::new_v4(),
            duration_value: 1,
            duration_unit: DurationUnit::Year,
        };
        let metadata = serde_json::to_value(&intent).unwrap();
        assert_eq!(metadata["action"], json!("NEW_LEASE"));
        let parsed: PaymentIntent = serde_json::from_value(metadata).unwrap();
        assert_eq!(parsed, intent);
    }
}

use serde_json::Value;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Payment, PaymentStatus};

const PAYMENT_COLUMNS: &str =
    "id, reference, user_id, lease_id, amount, status, payment_type, utility_token, \
     metadata, paid_date, created_at";

/// Fields merged into a payment row when it is marked PAID.
#[derive(Debug, Clone, Default)]
pub struct PaidPatch {
    pub lease_id: Option<Uuid>,
    pub utility_token: Option<String>,
    /// JSON object merged into the existing metadata (vending annotations).
    pub metadata_patch: Option<Value>,
}

pub async fn find_by_reference<'e, E: PgExecutor<'e>>(
    exec: E,
    reference: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
    ))
    .bind(reference)
    .fetch_optional(exec)
    .await
}

/// PENDING → FAILED. Idempotent, and never regresses a PAID row: a stale
/// gateway "failed" notification after a successful settlement must not undo
/// financial truth.
pub async fn mark_failed<'e, E: PgExecutor<'e>>(
    exec: E,
    reference: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET status = $2 WHERE reference = $1 AND status <> $3")
        .bind(reference)
        .bind(PaymentStatus::Failed)
        .bind(PaymentStatus::Paid)
        .execute(exec)
        .await?;
    Ok(())
}

/// Single-row atomic write: status=PAID, paid_date=now, plus whatever the
/// settlement branch produced. Callers are responsible for checking the
/// current status first — this function does not guard against re-running a
/// non-idempotent downstream action.
pub async fn mark_paid<'e, E: PgExecutor<'e>>(
    exec: E,
    payment_id: Uuid,
    patch: PaidPatch,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE payments
            SET status = $2,
                paid_date = now(),
                lease_id = COALESCE($3, lease_id),
                utility_token = COALESCE($4, utility_token),
                metadata = metadata || COALESCE($5, '{}'::jsonb)
          WHERE id = $1",
    )
    .bind(payment_id)
    .bind(PaymentStatus::Paid)
    .bind(patch.lease_id)
    .bind(patch.utility_token)
    .bind(patch.metadata_patch)
    .execute(exec)
    .await?;
    Ok(())
}

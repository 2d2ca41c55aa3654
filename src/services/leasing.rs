use chrono::{DateTime, Months, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::SettlementError;
use crate::models::{DurationUnit, Lease, LeaseStatus, Unit, UnitStatus};

const LEASE_COLUMNS: &str = "id, tenant_id, unit_id, start_date, end_date, rent_amount, status";

/// Calendar month/year addition. Adding 1 MONTH to Jan 31 lands on the last
/// valid day of February, matching `chrono`'s clamping semantics.
pub fn lease_end_date(base: DateTime<Utc>, duration_value: u32, unit: DurationUnit) -> DateTime<Utc> {
    let months = match unit {
        DurationUnit::Year => duration_value.saturating_mul(12),
        DurationUnit::Month => duration_value,
    };
    base.checked_add_months(Months::new(months)).unwrap_or(base)
}

/// Renewals extend from whichever is later: now, or the current end date.
/// A long-expired lease renews from today instead of reviving its stale end
/// date; a lease with remaining term keeps the unused remainder.
pub fn renewal_base(now: DateTime<Utc>, current_end: DateTime<Utc>) -> DateTime<Utc> {
    if current_end < now {
        now
    } else {
        current_end
    }
}

/// Create an ACTIVE lease on `unit_id`, claiming the unit first.
///
/// The claim is a conditional update (`status = AVAILABLE` in the WHERE
/// clause), so under two concurrent settlements for the same unit exactly one
/// succeeds and the other sees zero rows and aborts with `UnitUnavailable` —
/// read-committed isolation is enough. Must run inside the settlement
/// transaction so the claim rolls back with everything else.
pub async fn create_lease(
    tx: &mut PgConnection,
    tenant_id: Uuid,
    unit_id: Uuid,
    rent_amount: i64,
    duration_value: u32,
    duration_unit: DurationUnit,
    now: DateTime<Utc>,
) -> Result<Lease, SettlementError> {
    let claimed = sqlx::query("UPDATE units SET status = $2 WHERE id = $1 AND status = $3")
        .bind(unit_id)
        .bind(UnitStatus::Occupied)
        .bind(UnitStatus::Available)
        .execute(&mut *tx)
        .await?;
    if claimed.rows_affected() == 0 {
        return Err(SettlementError::UnitUnavailable);
    }

    let lease = sqlx::query_as::<_, Lease>(&format!(
        "INSERT INTO leases (id, tenant_id, unit_id, start_date, end_date, rent_amount, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {LEASE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(unit_id)
    .bind(now)
    .bind(lease_end_date(now, duration_value, duration_unit))
    .bind(rent_amount)
    .bind(LeaseStatus::Active)
    .fetch_one(&mut *tx)
    .await?;

    // First paid lease activates the tenant account.
    sqlx::query("UPDATE app_users SET status = 'ACTIVE' WHERE id = $1")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

    Ok(lease)
}

/// Extend a lease and re-activate it. Must run inside the settlement
/// transaction.
pub async fn renew_lease(
    tx: &mut PgConnection,
    lease_id: Uuid,
    duration_value: u32,
    duration_unit: DurationUnit,
    now: DateTime<Utc>,
) -> Result<Lease, SettlementError> {
    // Row lock so concurrent renewals of the same lease serialize on the
    // read-compute-write of end_date.
    let current = sqlx::query_as::<_, Lease>(&format!(
        "SELECT {LEASE_COLUMNS} FROM leases WHERE id = $1 FOR UPDATE"
    ))
    .bind(lease_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(SettlementError::LeaseNotFound)?;

    // An expired lease has released its unit; take it back unless another
    // tenant's ACTIVE lease (or maintenance) got there first.
    if current.status == LeaseStatus::Expired {
        let claimed = sqlx::query(
            "UPDATE units SET status = $3
              WHERE id = $1
                AND status <> $4
                AND NOT EXISTS (
                    SELECT 1 FROM leases
                     WHERE unit_id = $1 AND status = $5 AND id <> $2
                )",
        )
        .bind(current.unit_id)
        .bind(lease_id)
        .bind(UnitStatus::Occupied)
        .bind(UnitStatus::Maintenance)
        .bind(LeaseStatus::Active)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(SettlementError::UnitUnavailable);
        }
    }

    let new_end = lease_end_date(
        renewal_base(now, current.end_date),
        duration_value,
        duration_unit,
    );

    let lease = sqlx::query_as::<_, Lease>(&format!(
        "UPDATE leases SET end_date = $2, status = $3 WHERE id = $1 RETURNING {LEASE_COLUMNS}"
    ))
    .bind(lease_id)
    .bind(new_end)
    .bind(LeaseStatus::Active)
    .fetch_one(&mut *tx)
    .await?;

    Ok(lease)
}

/// Mark ACTIVE leases past their end date as EXPIRED and free their units.
/// Keeps the invariant that a unit is OCCUPIED iff an ACTIVE lease holds it.
pub async fn expire_overdue_leases(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let unit_ids: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE leases SET status = $1
          WHERE status = $2 AND end_date < now()
          RETURNING unit_id",
    )
    .bind(LeaseStatus::Expired)
    .bind(LeaseStatus::Active)
    .fetch_all(&mut *tx)
    .await?;

    if !unit_ids.is_empty() {
        sqlx::query("UPDATE units SET status = $2 WHERE id = ANY($1) AND status = $3")
            .bind(&unit_ids)
            .bind(UnitStatus::Available)
            .bind(UnitStatus::Occupied)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(unit_ids.len() as u64)
}

pub async fn get_unit(pool: &PgPool, unit_id: Uuid) -> Result<Option<Unit>, sqlx::Error> {
    sqlx::query_as::<_, Unit>("SELECT id, property_id, name, status FROM units WHERE id = $1")
        .bind(unit_id)
        .fetch_optional(pool)
        .await
}

/// The tenant's most recent renewable lease (ACTIVE, or EXPIRED and eligible
/// for re-activation).
pub async fn find_renewable_lease(
    pool: &PgPool,
    tenant_id: Uuid,
) -> Result<Option<Lease>, sqlx::Error> {
    sqlx::query_as::<_, Lease>(&format!(
        "SELECT {LEASE_COLUMNS} FROM leases
          WHERE tenant_id = $1 AND status IN ('ACTIVE', 'EXPIRED')
          ORDER BY end_date DESC
          LIMIT 1"
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn month_addition_clamps_to_end_of_february() {
        let end = lease_end_date(utc(2025, 1, 31), 1, DurationUnit::Month);
        assert_eq!(end, utc(2025, 2, 28));
    }

    #[test]
    fn month_addition_respects_leap_years() {
        let end = lease_end_date(utc(2024, 1, 31), 1, DurationUnit::Month);
        assert_eq!(end, utc(2024, 2, 29));
    }

    #[test]
    fn year_addition_is_calendar_years() {
        let end = lease_end_date(utc(2025, 3, 15), 2, DurationUnit::Year);
        assert_eq!(end, utc(2027, 3, 15));
        // Feb 29 + 1 year clamps to Feb 28.
        let end = lease_end_date(utc(2024, 2, 29), 1, DurationUnit::Year);
        assert_eq!(end, utc(2025, 2, 28));
    }

    #[test]
    fn expired_lease_renews_from_now() {
        let now = utc(2025, 6, 1);
        let stale_end = utc(2020, 1, 1);
        assert_eq!(renewal_base(now, stale_end), now);
        assert_eq!(
            lease_end_date(renewal_base(now, stale_end), 1, DurationUnit::Year),
            utc(2026, 6, 1)
        );
    }

    #[test]
    fn unexpired_lease_keeps_remaining_term() {
        let now = utc(2025, 6, 1);
        let future_end = utc(2025, 9, 30);
        assert_eq!(renewal_base(now, future_end), future_end);
        assert_eq!(
            lease_end_date(renewal_base(now, future_end), 6, DurationUnit::Month),
            utc(2026, 3, 30)
        );
    }
}

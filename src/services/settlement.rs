use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SettlementError;
use crate::models::{DurationUnit, Payment, PaymentIntent, PaymentStatus};
use crate::services::ledger::{self, PaidPatch};
use crate::services::leasing;
use crate::services::paystack::GatewayVerifier;
use crate::services::vtpass::{VendReceipt, VendingClient};

/// What `settle` hands back to the HTTP layer. Replays of an already-settled
/// reference return the identical outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Money captured but fulfillment failed; needs manual reconciliation.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_attention: bool,
}

impl SettlementOutcome {
    fn settled(message: &str, token: Option<String>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            token,
            requires_attention: false,
        }
    }
}

/// A pure-database settlement action. Kept as a separate type from
/// [`ExternalCallAction`] so the transactional path cannot be handed
/// something that performs a network call.
#[derive(Debug, Clone, PartialEq)]
enum PureStateAction {
    NewLease {
        target_unit_id: Uuid,
        duration_value: u32,
        duration_unit: DurationUnit,
    },
    Renewal {
        lease_id: Uuid,
        duration_value: u32,
        duration_unit: DurationUnit,
    },
}

/// A settlement action that calls out over the network and therefore must
/// never run inside an open database transaction.
#[derive(Debug, Clone, PartialEq)]
struct ExternalCallAction {
    service_id: String,
    meter_number: String,
    variation_type: Option<String>,
    phone: String,
}

#[derive(Debug, Clone, PartialEq)]
enum SettlementPlan {
    PureState(PureStateAction),
    ExternalCall(ExternalCallAction),
}

/// Orchestrates gateway verification → intent dispatch → ledger update.
/// Sole writer of `payments.status` transitions and sole trigger of
/// lease/unit mutation on settlement.
#[derive(Clone)]
pub struct ReconciliationEngine {
    gateway: Arc<dyn GatewayVerifier>,
    vending: Arc<dyn VendingClient>,
}

impl ReconciliationEngine {
    pub fn new(gateway: Arc<dyn GatewayVerifier>, vending: Arc<dyn VendingClient>) -> Self {
        Self { gateway, vending }
    }

    /// Settle a payment reference. Safe to call any number of times for the
    /// same reference: duplicate webhook deliveries and poll-and-confirm
    /// clients all converge on the first recorded outcome.
    pub async fn settle(
        &self,
        pool: &PgPool,
        reference: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        // Phase 1: confirm money actually moved. An unreachable gateway
        // propagates untouched so the caller can retry.
        let verification = self.gateway.verify(reference).await?;

        if !verification.settled {
            ledger::mark_failed(pool, reference).await?;
            tracing::info!(reference, raw_status = %verification.raw_status, "Payment not settled");
            return Err(SettlementError::PaymentNotSettled);
        }

        let payment = ledger::find_by_reference(pool, reference)
            .await?
            .ok_or_else(|| {
                tracing::error!(reference, "Settled reference has no payment row");
                SettlementError::PaymentRecordMissing
            })?;

        // Idempotency short-circuit: PAID is terminal, replay the recorded
        // outcome without re-running any side effect.
        if payment.status == PaymentStatus::Paid {
            return Ok(SettlementOutcome::settled(
                "Transaction already processed.",
                payment.utility_token.clone(),
            ));
        }

        if let Some(gateway_amount) = verification.amount_minor {
            if gateway_amount != payment.amount {
                // Hardening signal only; observed behavior does not block.
                tracing::warn!(
                    reference,
                    stored_amount = payment.amount,
                    gateway_amount,
                    "Gateway-reported amount differs from stored payment amount"
                );
            }
        }

        match plan_settlement(&payment)? {
            SettlementPlan::ExternalCall(action) => {
                self.settle_with_external_call(pool, &payment, action).await
            }
            SettlementPlan::PureState(action) => {
                settle_pure_state(pool, &payment, action).await
            }
        }
    }

    /// Vending path. Runs outside any transaction — the provider call's
    /// latency must never hold a database lock — and updates the ledger
    /// afterward based on the call's outcome.
    async fn settle_with_external_call(
        &self,
        pool: &PgPool,
        payment: &Payment,
        action: ExternalCallAction,
    ) -> Result<SettlementOutcome, SettlementError> {
        let vend = self
            .vending
            .purchase(
                &payment.reference,
                &action.service_id,
                &action.meter_number,
                action.variation_type.as_deref(),
                payment.amount,
                &action.phone,
            )
            .await;

        match vend {
            Ok(receipt) => {
                ledger::mark_paid(pool, payment.id, vend_success_patch(&receipt)).await?;
                Ok(SettlementOutcome::settled(
                    "Purchase successful!",
                    Some(receipt.token),
                ))
            }
            Err(SettlementError::VendingFailed(reason)) => {
                // The gateway captured the money regardless of the vend, so
                // this is still PAID — flagged for manual follow-up, never
                // regressed to FAILED.
                tracing::error!(
                    reference = %payment.reference,
                    reason = %reason,
                    "Vending failed after captured payment"
                );
                ledger::mark_paid(pool, payment.id, vend_failure_patch(&reason)).await?;
                Ok(SettlementOutcome {
                    success: true,
                    message: "Payment received, but token generation delayed.".to_string(),
                    token: None,
                    requires_attention: true,
                })
            }
            // Network-level failure: payment stays PENDING. A retry re-vends
            // with the same request_id and the provider deduplicates.
            Err(other) => Err(other),
        }
    }
}

/// Lease path. Everything is a database write, so the lease/unit mutation
/// and the PAID mark commit or roll back as one unit — a lease must never
/// exist without its payment marked PAID, and vice versa.
async fn settle_pure_state(
    pool: &PgPool,
    payment: &Payment,
    action: PureStateAction,
) -> Result<SettlementOutcome, SettlementError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let lease_id = match action {
        PureStateAction::NewLease {
            target_unit_id,
            duration_value,
            duration_unit,
        } => {
            let lease = leasing::create_lease(
                &mut tx,
                payment.user_id,
                target_unit_id,
                payment.amount,
                duration_value,
                duration_unit,
                now,
            )
            .await?;
            Some(lease.id)
        }
        PureStateAction::Renewal {
            lease_id,
            duration_value,
            duration_unit,
        } => {
            leasing::renew_lease(&mut tx, lease_id, duration_value, duration_unit, now).await?;
            Some(lease_id)
        }
    };

    ledger::mark_paid(
        &mut *tx,
        payment.id,
        PaidPatch {
            lease_id,
            ..PaidPatch::default()
        },
    )
    .await?;

    tx.commit().await?;
    Ok(SettlementOutcome::settled(
        "Transaction successful and lease updated.",
        None,
    ))
}

/// Classify a pending payment into the transactional or the external-call
/// path. Pure, so the dispatch rules are testable without a database.
fn plan_settlement(payment: &Payment) -> Result<SettlementPlan, SettlementError> {
    let intent = payment.intent().map_err(|e| {
        // Same data-integrity class as a missing row: the initiation step
        // wrote something settlement cannot act on.
        tracing::error!(
            payment_id = %payment.id,
            reference = %payment.reference,
            error = %e,
            "Payment metadata does not parse into a known intent"
        );
        SettlementError::PaymentRecordMissing
    })?;

    Ok(match intent {
        PaymentIntent::UtilityPurchase {
            service_id,
            meter_number,
            variation_type,
            phone,
        } => SettlementPlan::ExternalCall(ExternalCallAction {
            service_id,
            meter_number,
            variation_type,
            phone,
        }),
        PaymentIntent::NewLease {
            target_unit_id,
            duration_value,
            duration_unit,
        } => SettlementPlan::PureState(PureStateAction::NewLease {
            target_unit_id,
            duration_value,
            duration_unit,
        }),
        PaymentIntent::RentRenewal {
            duration_value,
            duration_unit,
        } => {
            let lease_id = payment.lease_id.ok_or(SettlementError::LeaseNotFound)?;
            SettlementPlan::PureState(PureStateAction::Renewal {
                lease_id,
                duration_value,
                duration_unit,
            })
        }
    })
}

fn vend_success_patch(receipt: &VendReceipt) -> PaidPatch {
    PaidPatch {
        lease_id: None,
        utility_token: Some(receipt.token.clone()),
        metadata_patch: Some(json!({
            "vendingStatus": "SUCCESS",
            "providerTxnId": receipt.provider_txn_id,
        })),
    }
}

fn vend_failure_patch(reason: &str) -> PaidPatch {
    PaidPatch {
        lease_id: None,
        utility_token: None,
        metadata_patch: Some(json!({
            "vendingStatus": "FAILED",
            "vendingError": reason,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentType;
    use chrono::Utc;
    use serde_json::{json, Value};

    fn payment(lease_id: Option<Uuid>, metadata: Value) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            reference: "RENT-abcde-1700000000000".to_string(),
            user_id: Uuid::new_v4(),
            lease_id,
            amount: 450_000,
            status: PaymentStatus::Pending,
            payment_type: PaymentType::Rent,
            utility_token: None,
            metadata,
            paid_date: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn utility_intent_plans_the_external_call_path() {
        let p = payment(
            None,
            json!({
                "action": "UTILITY_PURCHASE",
                "serviceID": "ikeja-electric",
                "meterNumber": "1111",
                "phone": "08012345678",
            }),
        );
        match plan_settlement(&p).expect("plan") {
            SettlementPlan::ExternalCall(action) => {
                assert_eq!(action.service_id, "ikeja-electric");
                assert_eq!(action.variation_type, None);
            }
            other => panic!("expected external-call plan, got {other:?}"),
        }
    }

    #[test]
    fn new_lease_intent_plans_the_transactional_path() {
        let unit_id = Uuid::new_v4();
        let p = payment(
            None,
            json!({
                "action": "NEW_LEASE",
                "targetUnitId": unit_id,
                "durationValue": 1,
                "durationUnit": "YEAR",
            }),
        );
        assert_eq!(
            plan_settlement(&p).expect("plan"),
            SettlementPlan::PureState(PureStateAction::NewLease {
                target_unit_id: unit_id,
                duration_value: 1,
                duration_unit: DurationUnit::Year,
            })
        );
    }

    #[test]
    fn renewal_without_lease_id_is_lease_not_found() {
        let p = payment(None, json!({ "action": "RENT_RENEWAL" }));
        assert!(matches!(
            plan_settlement(&p),
            Err(SettlementError::LeaseNotFound)
        ));
    }

    #[test]
    fn renewal_plan_carries_the_payment_lease_id() {
        let lease_id = Uuid::new_v4();
        let p = payment(
            Some(lease_id),
            json!({ "action": "RENT_RENEWAL", "durationValue": 6, "durationUnit": "MONTH" }),
        );
        assert_eq!(
            plan_settlement(&p).expect("plan"),
            SettlementPlan::PureState(PureStateAction::Renewal {
                lease_id,
                duration_value: 6,
                duration_unit: DurationUnit::Month,
            })
        );
    }

    #[test]
    fn unknown_metadata_is_a_data_integrity_fault() {
        let p = payment(None, json!({ "action": "SOMETHING_ELSE" }));
        assert!(matches!(
            plan_settlement(&p),
            Err(SettlementError::PaymentRecordMissing)
        ));
    }

    #[test]
    fn vend_failure_patch_keeps_payment_paid_without_token() {
        let patch = vend_failure_patch("TRANSACTION FAILED");
        assert_eq!(patch.utility_token, None);
        let meta = patch.metadata_patch.expect("patch metadata");
        assert_eq!(meta["vendingStatus"], "FAILED");
        assert_eq!(meta["vendingError"], "TRANSACTION FAILED");
    }

    #[test]
    fn vend_success_patch_records_token_and_provider_txn() {
        let patch = vend_success_patch(&VendReceipt {
            token: "1234-5678".to_string(),
            provider_txn_id: Some("17001".to_string()),
        });
        assert_eq!(patch.utility_token.as_deref(), Some("1234-5678"));
        let meta = patch.metadata_patch.expect("patch metadata");
        assert_eq!(meta["vendingStatus"], "SUCCESS");
        assert_eq!(meta["providerTxnId"], "17001");
    }

    #[test]
    fn outcome_serializes_in_wire_shape() {
        let ok = SettlementOutcome::settled("Purchase successful!", Some("1234".to_string()));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "success": true, "message": "Purchase successful!", "token": "1234" })
        );

        let attention = SettlementOutcome {
            success: true,
            message: "Payment received, but token generation delayed.".to_string(),
            token: None,
            requires_attention: true,
        };
        assert_eq!(
            serde_json::to_value(&attention).unwrap(),
            json!({
                "success": true,
                "message": "Payment received, but token generation delayed.",
                "requiresAttention": true,
            })
        );
    }
}

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{PaymentIntent, PaymentType};
use crate::services::paystack::PaystackGateway;
use crate::services::rent::{insert_pending_payment, payment_reference, InitiatedPayment};
use crate::services::users;
use crate::services::vtpass::{MeterCustomer, VtPassClient};

/// Fallback when the tenant has no phone on file; the vending provider
/// requires one.
const FALLBACK_PHONE: &str = "08000000000";

/// Pass-through customer lookup so the frontend can show who owns a meter
/// before the tenant pays.
pub async fn verify_meter(
    vtpass: &VtPassClient,
    service_id: &str,
    meter_number: &str,
    variation_type: Option<&str>,
) -> AppResult<MeterCustomer> {
    vtpass
        .verify_meter(service_id, meter_number, variation_type)
        .await
        .map_err(|e| AppError::BadRequest(format!("Could not verify meter number: {e}")))
}

/// Start a utility purchase. Everything the settlement-time vend needs
/// (service, meter, variation, phone) is packed into the intent metadata.
pub async fn initiate_purchase(
    pool: &PgPool,
    gateway: &PaystackGateway,
    frontend_url: &str,
    user_id: Uuid,
    service_id: String,
    meter_number: String,
    variation_type: Option<String>,
    amount_minor: i64,
) -> AppResult<InitiatedPayment> {
    let user = users::get_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("User not found".to_string()))?;

    let intent = PaymentIntent::UtilityPurchase {
        service_id,
        meter_number,
        variation_type,
        phone: user
            .phone
            .clone()
            .unwrap_or_else(|| FALLBACK_PHONE.to_string()),
    };

    let reference = payment_reference("UTIL", user_id);
    let callback_url = format!("{frontend_url}/payment/verify");
    let url = gateway
        .initialize_transaction(&user.email, amount_minor, &reference, &callback_url)
        .await
        .map_err(AppError::from)?;

    insert_pending_payment(
        pool,
        user_id,
        None,
        amount_minor,
        &reference,
        PaymentType::UtilityToken,
        &intent,
    )
    .await?;

    Ok(InitiatedPayment { url, reference })
}

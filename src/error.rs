use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// HTTP-facing error. Every handler returns `AppResult<T>` and the
/// conversion below decides the status code and the `{"detail": …}` body.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// An upstream dependency (gateway, vending provider, database) is
    /// unreachable or misconfigured. Safe to retry later.
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, detail = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Record not found.".to_string()),
            other => Self::Internal(format!("Database error: {other}")),
        }
    }
}

/// Domain error taxonomy of the settlement flow.
///
/// `VendingFailed` never escapes `ReconciliationEngine::settle` — a failed
/// vend after a captured payment is reported as a successful settlement
/// flagged `requiresAttention`, not as an error.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Network-level failure talking to the gateway or vending provider.
    /// The payment row is left untouched so the caller can retry.
    #[error("Could not contact {0}. Please retry shortly.")]
    UpstreamUnavailable(&'static str),
    /// The gateway reports the transaction did not settle. Terminal.
    #[error("Payment was not successful.")]
    PaymentNotSettled,
    /// No payment row exists for the reference. The initiation step never
    /// persisted one — a data-integrity fault, not a user error.
    #[error("Transaction record not found.")]
    PaymentRecordMissing,
    /// The target unit was claimed by a concurrent settlement. The whole
    /// transaction rolls back and the payment stays at its prior status;
    /// money was captured, so support must resolve it.
    #[error("This unit was taken by another user. You were charged — please contact support.")]
    UnitUnavailable,
    /// Provider declined the vend after the payment was captured.
    #[error("Vending failed: {0}")]
    VendingFailed(String),
    /// Renewal target no longer resolves.
    #[error("Lease record missing.")]
    LeaseNotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::UpstreamUnavailable(_) => Self::Dependency(err.to_string()),
            SettlementError::PaymentNotSettled => Self::BadRequest(err.to_string()),
            SettlementError::PaymentRecordMissing => Self::NotFound(err.to_string()),
            SettlementError::UnitUnavailable => Self::Conflict(err.to_string()),
            SettlementError::LeaseNotFound => Self::BadRequest(err.to_string()),
            SettlementError::VendingFailed(_) => Self::Internal(err.to_string()),
            SettlementError::Db(e) => AppError::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_settlement_errors_to_http_statuses() {
        let cases = [
            (
                SettlementError::UpstreamUnavailable("the payment provider"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (SettlementError::PaymentNotSettled, StatusCode::BAD_REQUEST),
            (SettlementError::PaymentRecordMissing, StatusCode::NOT_FOUND),
            (SettlementError::UnitUnavailable, StatusCode::CONFLICT),
            (SettlementError::LeaseNotFound, StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }
}

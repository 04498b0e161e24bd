//! Payment API handlers.
//!
//! # Endpoints
//!
//! - `POST /payments`                         – create an operation and request its evaluation
//! - `GET  /payments/{externalOperationId}`   – current status of an operation
//!
//! An operation is persisted as `evaluating` before its risk request is
//! emitted. If the emit fails the caller gets a 500 and the operation stays
//! `evaluating`; nothing retries it later.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use payrisk_core::bus::PublishError;
use payrisk_core::entities::Operation;
use payrisk_core::store::StoreError;
use payrisk_sdk::objects::CreatePaymentRequest;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::state::AppState;

/// Decimal places an amount may carry; matches `NUMERIC(20, 4)` in the operations table.
const MAX_AMOUNT_SCALE: u32 = 4;

/// Build the payment API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/{external_operation_id}", get(get_payment))
}

/// `POST /payments` — create a new operation in `evaluating`.
async fn create_payment(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    if payload.amount <= Decimal::ZERO {
        return Err(PaymentApiError::InvalidAmount(payload.amount));
    }
    if payload.amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(PaymentApiError::AmountScale(payload.amount));
    }

    let operation = Operation::new_evaluating(
        payload.customer_id,
        payload.service_provider_id,
        payload.payment_method_id,
        payload.amount,
    );
    state
        .store
        .insert(&operation)
        .await
        .map_err(PaymentApiError::Store)?;

    tracing::info!(
        correlation_id = %operation.correlation_id,
        customer_id = %operation.customer_id,
        amount = %operation.amount,
        "Operation created"
    );

    state
        .emitter
        .emit(operation.risk_request())
        .await
        .map_err(|e| PaymentApiError::Emit(operation.correlation_id, e))?;

    Ok((StatusCode::CREATED, Json(operation.to_created_response())))
}

/// `GET /payments/{externalOperationId}` — read an operation's status.
///
/// `evaluating` is returned as a normal 200 response.
async fn get_payment(
    State(state): State<AppState>,
    Path(external_operation_id): Path<Uuid>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let operation = state
        .store
        .get_by_correlation_id(external_operation_id)
        .await
        .map_err(PaymentApiError::Store)?
        .ok_or(PaymentApiError::NotFound)?;

    Ok(Json(operation.to_response()))
}

/// Errors that can occur in payment API handlers.
#[derive(Debug)]
enum PaymentApiError {
    /// The amount was zero or negative.
    InvalidAmount(Decimal),
    /// The amount has more decimal places than the store keeps.
    AmountScale(Decimal),
    /// The requested operation was not found.
    NotFound,
    /// The operation store failed.
    Store(StoreError),
    /// The operation was stored but its risk request could not be published.
    Emit(Uuid, PublishError),
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            PaymentApiError::InvalidAmount(amount) => (
                StatusCode::BAD_REQUEST,
                format!("amount must be greater than zero, got {amount}"),
            )
                .into_response(),
            PaymentApiError::AmountScale(amount) => (
                StatusCode::BAD_REQUEST,
                format!(
                    "amount supports at most {MAX_AMOUNT_SCALE} decimal places, got {amount}"
                ),
            )
                .into_response(),
            PaymentApiError::NotFound => {
                (StatusCode::NOT_FOUND, "operation not found").into_response()
            }
            PaymentApiError::Store(e) => {
                tracing::error!(error = %e, "Payment API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            PaymentApiError::Emit(correlation_id, e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Risk request not published, operation left evaluating"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

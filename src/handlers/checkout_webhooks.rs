use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics::counter;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    checkout::payos::{verify_webhook, WebhookPayload},
    entities::payment::PaymentStatus,
    errors::ServiceError,
    AppState,
};

/// Result code the provider uses for a successful payment.
const PAID_CODE: &str = "00";

// POST /webhooks/checkout
//
// Payment confirmations from the checkout provider. Anything the provider
// cannot fix by retrying (unknown order code, a payment already closed the
// other way) is acknowledged so it stops redelivering.
#[instrument(skip(state, payload), fields(order_code = tracing::field::Empty))]
pub async fn checkout_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    if !verify_webhook(&state.config.checkout_checksum_key, &payload) {
        warn!("Checkout webhook signature verification failed");
        counter!("petcare_webhooks.checkout.bad_signature", 1);
        return Err(ServiceError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    let order_code = payload.order_code().ok_or_else(|| {
        ServiceError::ValidationError("webhook data carries no orderCode".to_string())
    })?;
    tracing::Span::current().record("order_code", order_code);

    let status = if payload.result_code() == PAID_CODE {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Failed
    };

    match state
        .payments
        .update_bank_payment_status(order_code, status)
        .await
    {
        Ok(_) => {
            info!(%status, "Checkout webhook applied");
        }
        Err(ServiceError::NotFound(msg)) => {
            warn!(%msg, "Checkout webhook for unknown order code acknowledged");
        }
        Err(e @ (ServiceError::InvalidTransition { .. } | ServiceError::FailedPrecondition(_))) => {
            warn!(error = %e, "Checkout webhook conflicts with payment state, acknowledged");
            counter!("petcare_webhooks.checkout.conflict", 1);
        }
        Err(e) => {
            error!(error = %e, "Checkout webhook processing failed");
            return Err(e);
        }
    }

    Ok((StatusCode::OK, Json(json!({ "success": true }))))
}

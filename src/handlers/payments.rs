use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{AppError, BookingError};
use crate::handlers::auth::require_user;
use crate::models::Booking;
use crate::services::commit;
use crate::services::payments::PaymentProof;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Serialize)]
pub struct VerifyResponse {
    pub booking: Booking,
    pub replayed: bool,
}

// POST /api/payments/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(proof): Json<PaymentProof>,
) -> Result<Json<VerifyResponse>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let committed = commit::commit_with_proof(&state, &proof, &user_id).await?;
    Ok(Json(VerifyResponse {
        booking: committed.booking,
        replayed: committed.replayed,
    }))
}

// `(order_id, payment_id)` of a capture notification
fn captured_payment(payload: &Value) -> Option<(String, String)> {
    if payload["event"].as_str() != Some("payment.captured") {
        return None;
    }
    let entity = &payload["payload"]["payment"]["entity"];
    let payment_id = entity["id"].as_str()?;
    let order_id = entity["order_id"].as_str()?;
    Some((order_id.to_string(), payment_id.to_string()))
}

// POST /webhook/payments
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !state.payments.verify_webhook(&body, signature) {
        tracing::warn!("rejected payment webhook with bad signature");
        return Err(BookingError::InvalidSignature.into());
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| BookingError::Validation(format!("malformed webhook body: {e}")))?;

    let Some((order_id, payment_id)) = captured_payment(&payload) else {
        tracing::debug!(event = ?payload["event"], "ignoring payment webhook");
        return Ok(Json(json!({ "status": "ignored" })));
    };

    // Business rejections are acknowledged so the processor stops redelivering.
    match commit::commit_from_webhook(&state, &order_id, &payment_id).await {
        Ok(None) => Ok(Json(json!({ "status": "ignored" }))),
        Ok(Some(committed)) => Ok(Json(json!({
            "status": if committed.replayed { "duplicate" } else { "committed" },
            "booking_id": committed.booking.id,
        }))),
        Err(e @ BookingError::RefundPending { .. }) => Ok(Json(json!({
            "status": "refund_pending",
            "detail": e.to_json(),
        }))),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_payment_extraction() {
        let payload = json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1", "amount": 100}}}
        });
        assert_eq!(
            captured_payment(&payload),
            Some(("order_1".to_string(), "pay_1".to_string()))
        );

        let other = json!({"event": "payment.failed", "payload": payload["payload"].clone()});
        assert_eq!(captured_payment(&other), None);

        let broken = json!({"event": "payment.captured", "payload": {}});
        assert_eq!(captured_payment(&broken), None);
    }
}

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::config::BookingPolicy;
use crate::errors::BookingError;
use crate::models::BookingContext;
use crate::services::admission::Admission;
use crate::services::payments::{OrderRequest, PaymentGateway};

const MAX_RECEIPT_LEN: usize = 40;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub receipt: String,
    pub slot_ref: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub player_count: i64,
}

/// `rcpt_<millis>_<court prefix>`, cut to the processor's length limit.
pub fn build_receipt(court_id: &str, at: DateTime<Utc>) -> Result<String, BookingError> {
    let head = format!("rcpt_{}_", at.timestamp_millis());
    let room = MAX_RECEIPT_LEN.saturating_sub(head.len());
    let prefix: String = court_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(room)
        .collect();

    if prefix.is_empty() {
        return Err(BookingError::Internal(anyhow::anyhow!(
            "cannot build a payment receipt for court {court_id:?}"
        )));
    }
    Ok(format!("{head}{prefix}"))
}

// Nothing is written locally. Processor failures are not retried.
pub async fn open(
    gateway: &dyn PaymentGateway,
    admission: &Admission,
    policy: &BookingPolicy,
    issued_at: DateTime<Utc>,
) -> Result<PaymentIntent, BookingError> {
    let slot = &admission.slot;
    let receipt = build_receipt(&slot.court.id, issued_at)?;

    let context = BookingContext {
        slot_ref: slot.slot_ref.clone(),
        court_id: slot.court.id.clone(),
        user_id: admission.user_id.clone(),
        player_count: admission.player_count,
        notes: admission.notes.clone(),
        venue_name: slot.court.venue_name.clone(),
        court_name: slot.court.name.clone(),
        start_at: slot.start_at,
        end_at: slot.end_at,
        amount: admission.quote,
    };

    let request = OrderRequest {
        amount: admission.quote,
        currency: policy.currency.clone(),
        receipt: receipt.clone(),
        notes: context.to_notes(),
    };

    let order = gateway.create_order(&request).await.map_err(|e| {
        tracing::error!(
            error = %e,
            user_id = %admission.user_id,
            slot_ref = %slot.slot_ref,
            "failed to open payment order"
        );
        BookingError::Internal(e.context("payment order creation failed"))
    })?;

    tracing::info!(
        order_id = %order.id,
        user_id = %admission.user_id,
        slot_ref = %slot.slot_ref,
        amount = order.amount,
        "payment order opened"
    );

    Ok(PaymentIntent {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        key_id: gateway.key_id().to_string(),
        receipt,
        slot_ref: slot.slot_ref.clone(),
        start_at: slot.start_at,
        end_at: slot.end_at,
        player_count: admission.player_count,
    })
}

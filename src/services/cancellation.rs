use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};

use crate::config::BookingPolicy;
use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, BookingEvent, BookingStatus, PaymentStatus, StoredEvent};
use crate::services::events;

/// Cancels a booking on behalf of its owner and gives its players back to the
/// court interval in the same transaction.
pub fn cancel(
    conn: &mut Connection,
    booking_id: &str,
    actor_user_id: &str,
    reason: Option<&str>,
    policy: &BookingPolicy,
    now: &NaiveDateTime,
) -> Result<(Booking, StoredEvent), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;

    if booking.user_id != actor_user_id {
        return Err(BookingError::AccessDenied);
    }
    match booking.status {
        BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled),
        BookingStatus::Completed => return Err(BookingError::Immutable),
        BookingStatus::Pending | BookingStatus::Confirmed => {}
    }

    let closed_at = booking.start_at - policy.cancellation_window;
    if *now > closed_at {
        return Err(BookingError::CancellationWindowClosed {
            starts_at: booking.start_at,
            closed_at,
        });
    }

    let payment_status = match booking.payment_status {
        PaymentStatus::Paid => PaymentStatus::Refunded,
        other => other,
    };
    if !queries::mark_booking_cancelled(&tx, &booking.id, reason, payment_status, now)? {
        return Err(BookingError::AlreadyCancelled);
    }
    if let Some(slot_id) = &booking.slot_id {
        queries::release_slot_booking(&tx, slot_id)?;
    }

    let refund_amount = if payment_status == PaymentStatus::Refunded {
        booking.payment.as_ref().map(|p| p.amount).unwrap_or(booking.total_price)
    } else {
        0
    };
    let event = events::record(
        &tx,
        BookingEvent::BookingCancelled {
            booking_id: booking.id.clone(),
            user_id: booking.user_id.clone(),
            reason: reason.map(|r| r.to_string()),
            refund_amount,
            payment_id: booking.payment.as_ref().map(|p| p.payment_id.clone()),
        },
        now,
    )?;

    let updated = queries::get_booking_by_id(&tx, &booking.id)?
        .ok_or_else(|| BookingError::Internal(anyhow::anyhow!("booking {} vanished mid-cancel", booking.id)))?;
    tx.commit()?;

    tracing::info!(
        booking_id = %updated.id,
        user_id = %updated.user_id,
        refund_amount,
        "booking cancelled"
    );
    Ok((updated, event))
}

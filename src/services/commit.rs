use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::config::BookingPolicy;
use crate::db::queries::{self, RefundClaim};
use crate::errors::BookingError;
use crate::models::{
    Booking, BookingContext, BookingEvent, BookingStatus, PaymentSnapshot, PaymentStatus,
    ResolvedSlot, StoredEvent,
};
use crate::services::payments::{Order, Payment, PaymentGateway, PaymentProof};
use crate::services::{events, ledger, slots};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    // must own the order
    User(String),
    // signed webhook
    Processor,
}

#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub order: Order,
    pub payment: Payment,
    pub context: BookingContext,
}

#[derive(Debug)]
pub enum CommitOutcome {
    Committed { booking: Booking, event: StoredEvent },
    Replayed(Booking),
    // Paid, but the re-check failed. A refund claim was recorded.
    Rejected {
        cause: BookingError,
        claim: RefundClaim,
        event: StoredEvent,
    },
}

#[derive(Debug, Clone)]
pub struct Committed {
    pub booking: Booking,
    pub replayed: bool,
}

pub fn verify_proof(gateway: &dyn PaymentGateway, proof: &PaymentProof) -> Result<(), BookingError> {
    if gateway.verify_signature(&proof.order_id, &proof.payment_id, &proof.signature) {
        Ok(())
    } else {
        tracing::warn!(order_id = %proof.order_id, payment_id = %proof.payment_id, "payment signature mismatch");
        Err(BookingError::InvalidSignature)
    }
}

/// Fetches the order and payment from the processor and checks they agree.
///
/// An order carrying no booking metadata at all is `NotFound`: it belongs to
/// something else sold on the same processor account.
pub async fn confirm_payment(
    gateway: &dyn PaymentGateway,
    order_id: &str,
    payment_id: &str,
    actor: &Actor,
) -> Result<VerifiedPayment, BookingError> {
    let order = gateway.fetch_order(order_id).await.map_err(|e| {
        tracing::error!(error = %e, order_id, "failed to fetch payment order");
        BookingError::Internal(e)
    })?;
    let payment = gateway.fetch_payment(payment_id).await.map_err(|e| {
        tracing::error!(error = %e, payment_id, "failed to fetch payment");
        BookingError::Internal(e)
    })?;

    if payment.order_id != order.id || payment.amount != order.amount {
        tracing::warn!(
            order_id = %order.id,
            payment_id = %payment.id,
            payment_order_id = %payment.order_id,
            order_amount = order.amount,
            payment_amount = payment.amount,
            "payment does not match order"
        );
        return Err(BookingError::InvalidSignature);
    }
    if !payment.is_settled() {
        return Err(BookingError::Validation(format!(
            "payment {} is {}",
            payment.id, payment.status
        )));
    }

    if !BookingContext::is_booking_order(&order.notes) {
        return Err(BookingError::NotFound(format!("booking for order {}", order.id)));
    }
    let context = BookingContext::from_notes(&order.notes).map_err(|e| {
        tracing::error!(error = %e, order_id = %order.id, "order metadata unreadable");
        BookingError::Internal(e)
    })?;

    if let Actor::User(user_id) = actor {
        if *user_id != context.user_id {
            tracing::warn!(order_id = %order.id, user_id = %user_id, "commit attempted by non-owner");
            return Err(BookingError::AccessDenied);
        }
    }

    Ok(VerifiedPayment {
        order,
        payment,
        context,
    })
}

// Returns the slot plus the players already on it.
fn authorize(
    conn: &Connection,
    ctx: &BookingContext,
    policy: &BookingPolicy,
    now: &NaiveDateTime,
) -> Result<(ResolvedSlot, i64), BookingError> {
    let slot = slots::resolve(conn, &ctx.slot_ref, Some(&ctx.court_id), policy)?;
    if slot.start_at <= *now {
        return Err(BookingError::Validation(format!(
            "slot {} has already started",
            slot.slot_ref
        )));
    }
    if !slot.court.is_active {
        return Err(BookingError::CourtInactive);
    }

    let snapshot = ledger::snapshot(conn, &ctx.court_id, &ctx.start_at, &ctx.end_at, slot.capacity)?;
    if slot.is_closed() {
        return Err(BookingError::CapacityExceeded {
            requested: ctx.player_count,
            headroom: 0,
        });
    }
    let occupancy = snapshot.ensure_room_for(ctx.player_count)?;
    if let Some(existing) = snapshot.held_by(&ctx.user_id) {
        return Err(BookingError::DuplicateBooking {
            booking_id: existing.id.clone(),
        });
    }
    Ok((slot, occupancy.booked_players))
}

fn new_reference(conn: &Connection) -> Result<String, BookingError> {
    for _ in 0..5 {
        let candidate = format!("BK-{}", Uuid::new_v4().simple().to_string()[..8].to_uppercase());
        if !queries::reference_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(BookingError::Internal(anyhow::anyhow!(
        "could not allocate a unique booking reference"
    )))
}

/// Turns a verified payment into a confirmed booking. The immediate
/// transaction keeps concurrent writers out between the occupancy read and
/// the insert. Safe to call again with the same order.
pub fn commit_verified(
    conn: &mut Connection,
    verified: &VerifiedPayment,
    policy: &BookingPolicy,
    now: &NaiveDateTime,
) -> Result<CommitOutcome, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let order_id = verified.order.id.as_str();
    let ctx = &verified.context;

    if let Some(existing) = queries::get_booking_by_order_id(&tx, order_id)? {
        tracing::info!(order_id, booking_id = %existing.id, "payment already committed");
        return Ok(CommitOutcome::Replayed(existing));
    }
    if let Some(claim) = queries::get_refund_claim(&tx, order_id)? {
        tracing::info!(order_id, "payment already rejected for refund");
        return Err(BookingError::RefundPending {
            order_id: claim.order_id,
            reason_code: claim.reason_code,
            reason: claim.reason,
        });
    }

    let (slot, booked_players) = match authorize(&tx, ctx, policy, now) {
        Ok(admitted) => admitted,
        Err(e @ BookingError::Internal(_)) => return Err(e),
        Err(cause) => {
            tracing::warn!(
                order_id,
                user_id = %ctx.user_id,
                slot_ref = %ctx.slot_ref,
                reason = %cause,
                "paid booking rejected, refund required"
            );
            let claim = RefundClaim {
                order_id: order_id.to_string(),
                payment_id: verified.payment.id.clone(),
                user_id: ctx.user_id.clone(),
                amount: verified.payment.amount,
                currency: verified.payment.currency.clone(),
                reason_code: cause.code().to_string(),
                reason: cause.to_string(),
            };
            queries::insert_refund_claim(&tx, &claim, now)?;
            let event = events::record(
                &tx,
                BookingEvent::RefundRequired {
                    order_id: claim.order_id.clone(),
                    payment_id: claim.payment_id.clone(),
                    user_id: claim.user_id.clone(),
                    amount: claim.amount,
                    currency: claim.currency.clone(),
                    reason: claim.reason.clone(),
                },
                now,
            )?;
            tx.commit()?;
            return Ok(CommitOutcome::Rejected { cause, claim, event });
        }
    };

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        reference: new_reference(&tx)?,
        user_id: ctx.user_id.clone(),
        court_id: ctx.court_id.clone(),
        slot_id: slot.persisted_slot_id().map(|s| s.to_string()),
        slot_ref: slot.slot_ref.clone(),
        booking_date: ctx.start_at.date(),
        start_at: ctx.start_at,
        end_at: ctx.end_at,
        duration_minutes: (ctx.end_at - ctx.start_at).num_minutes(),
        player_count: ctx.player_count,
        total_price: verified.payment.amount,
        currency: verified.payment.currency.clone(),
        notes: ctx.notes.clone(),
        status: BookingStatus::Confirmed,
        payment_status: PaymentStatus::Paid,
        payment: Some(PaymentSnapshot {
            order_id: order_id.to_string(),
            payment_id: verified.payment.id.clone(),
            amount: verified.payment.amount,
            method: verified.payment.method.clone(),
            paid_at: *now,
        }),
        cancellation_reason: None,
        cancelled_at: None,
        created_at: *now,
        updated_at: *now,
    };
    queries::insert_booking(&tx, &booking)?;

    if let Some(slot_id) = slot.persisted_slot_id() {
        let exhausted = booked_players + ctx.player_count >= slot.capacity;
        queries::record_slot_booking(&tx, slot_id, exhausted)?;
    }

    let event = events::record(
        &tx,
        BookingEvent::BookingConfirmed {
            booking_id: booking.id.clone(),
            reference: booking.reference.clone(),
            user_id: booking.user_id.clone(),
            venue_name: ctx.venue_name.clone(),
            court_name: ctx.court_name.clone(),
            start_at: booking.start_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_at: booking.end_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            total_price: booking.total_price,
            currency: booking.currency.clone(),
        },
        now,
    )?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        reference = %booking.reference,
        order_id,
        court_id = %booking.court_id,
        players = booking.player_count,
        "booking confirmed"
    );
    Ok(CommitOutcome::Committed { booking, event })
}

pub async fn commit_with_proof(
    state: &Arc<AppState>,
    proof: &PaymentProof,
    user_id: &str,
) -> Result<Committed, BookingError> {
    let gateway = state.payments.as_ref();
    verify_proof(gateway, proof)?;
    let actor = Actor::User(user_id.to_string());
    let verified = confirm_payment(gateway, &proof.order_id, &proof.payment_id, &actor).await?;
    commit(state, verified)
}

// The webhook signature has already been checked. `None` means the order
// is not a booking order.
pub async fn commit_from_webhook(
    state: &Arc<AppState>,
    order_id: &str,
    payment_id: &str,
) -> Result<Option<Committed>, BookingError> {
    let verified = match confirm_payment(state.payments.as_ref(), order_id, payment_id, &Actor::Processor).await {
        Ok(verified) => verified,
        Err(BookingError::NotFound(_)) => {
            tracing::info!(order_id, payment_id, "captured payment is not for a booking");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    commit(state, verified).map(Some)
}

fn commit(state: &Arc<AppState>, verified: VerifiedPayment) -> Result<Committed, BookingError> {
    let policy = state.config.policy();
    let now = state.config.local_now();

    let outcome = {
        let mut conn = state.db()?;
        commit_verified(&mut conn, &verified, &policy, &now)?
    };

    match outcome {
        CommitOutcome::Committed { booking, event } => {
            events::announce(state, event);
            Ok(Committed {
                booking,
                replayed: false,
            })
        }
        CommitOutcome::Replayed(booking) => Ok(Committed {
            booking,
            replayed: true,
        }),
        CommitOutcome::Rejected { claim, event, .. } => {
            events::announce(state, event);
            Err(BookingError::RefundPending {
                order_id: claim.order_id,
                reason_code: claim.reason_code,
                reason: claim.reason,
            })
        }
    }
}

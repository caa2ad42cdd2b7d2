use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::BookingPolicy;
use crate::errors::BookingError;
use crate::models::payment::MAX_NOTE_LEN;
use crate::models::{ResolvedSlot, SlotKind};
use crate::services::{ledger, slots};

#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub slot_ref: String,
    pub court_id: Option<String>,
    pub user_id: String,
    pub player_count: i64,
    pub notes: Option<String>,
}

// Passed the advisory checks. Holds no capacity.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub slot: ResolvedSlot,
    pub user_id: String,
    pub player_count: i64,
    pub notes: Option<String>,
    pub quote: i64,
    pub booked_players: i64,
    pub headroom: i64,
}

// Advisory only: capacity is checked again when the payment is committed.
pub fn admit(
    conn: &Connection,
    req: &AdmissionRequest,
    policy: &BookingPolicy,
    now: &NaiveDateTime,
) -> Result<Admission, BookingError> {
    if req.player_count < 1 {
        return Err(BookingError::Validation(
            "player count must be at least 1".to_string(),
        ));
    }
    if let Some(notes) = &req.notes {
        if notes.chars().count() > MAX_NOTE_LEN {
            return Err(BookingError::Validation(format!(
                "notes must be at most {MAX_NOTE_LEN} characters"
            )));
        }
    }

    let slot = slots::resolve(conn, &req.slot_ref, req.court_id.as_deref(), policy)?;

    if slot.start_at <= *now {
        return Err(BookingError::Validation(format!(
            "slot {} has already started",
            slot.slot_ref
        )));
    }
    if !slot.court.is_active {
        return Err(BookingError::CourtInactive);
    }

    let snapshot = ledger::snapshot(conn, &slot.court.id, &slot.start_at, &slot.end_at, slot.capacity)?;
    if slot.is_closed() {
        return Err(BookingError::CapacityExceeded {
            requested: req.player_count,
            headroom: 0,
        });
    }
    let occupancy = snapshot.ensure_room_for(req.player_count)?;

    if let Some(existing) = snapshot.held_by(&req.user_id) {
        return Err(BookingError::DuplicateBooking {
            booking_id: existing.id.clone(),
        });
    }

    tracing::debug!(
        user_id = %req.user_id,
        slot_ref = %slot.slot_ref,
        players = req.player_count,
        headroom = occupancy.headroom(),
        "booking admitted"
    );

    Ok(Admission {
        quote: quote(&slot, req.player_count),
        user_id: req.user_id.clone(),
        player_count: req.player_count,
        notes: req.notes.clone(),
        booked_players: occupancy.booked_players,
        headroom: occupancy.headroom(),
        slot,
    })
}

/// Price in minor units. Virtual slots charge the hourly rate per player,
/// persisted slots split the slot's price across its capacity.
pub fn quote(slot: &ResolvedSlot, players: i64) -> i64 {
    match slot.kind {
        SlotKind::Virtual => slot.court.price_per_hour * players,
        SlotKind::Persisted { .. } => {
            let numerator = slot.court.price_per_hour * slot.duration_minutes() * players;
            let denominator = slot.capacity.max(1) * 60;
            (numerator + denominator / 2) / denominator
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheck {
    pub admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headroom: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<serde_json::Value>,
}

pub fn check_conflict(
    conn: &Connection,
    req: &AdmissionRequest,
    policy: &BookingPolicy,
    now: &NaiveDateTime,
) -> Result<ConflictCheck, BookingError> {
    match admit(conn, req, policy, now) {
        Ok(admission) => Ok(ConflictCheck {
            admitted: true,
            quote: Some(admission.quote),
            headroom: Some(admission.headroom),
            rejection: None,
        }),
        Err(e @ BookingError::Internal(_)) => Err(e),
        Err(e) => Ok(ConflictCheck {
            admitted: false,
            quote: None,
            headroom: match &e {
                BookingError::CapacityExceeded { headroom, .. } => Some(*headroom),
                _ => None,
            },
            rejection: Some(e.to_json()),
        }),
    }
}

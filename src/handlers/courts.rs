use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::services::{ledger, slots};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Serialize)]
pub struct SlotAvailability {
    pub slot_ref: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub capacity: i64,
    pub booked_players: i64,
    pub headroom: i64,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    pub court_id: String,
    pub court_name: String,
    pub venue_name: String,
    pub date: NaiveDate,
    pub is_active: bool,
    pub price_per_hour: i64,
    pub slots: Vec<SlotAvailability>,
}

// GET /api/courts/:court_id/slots?date=YYYY-MM-DD
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Path(court_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("invalid date {:?}, expected YYYY-MM-DD", query.date)))?;
    let policy = state.config.policy();

    let db = state.db()?;
    let court = queries::get_court(&db, &court_id)
        .map_err(BookingError::from)?
        .ok_or_else(|| BookingError::NotFound(format!("court {court_id}")))?;

    let mut listed = vec![];
    for slot in slots::generate_slots(&court, date, &policy) {
        let occupancy = ledger::occupancy(&db, &court.id, &slot.start_at, &slot.end_at, court.capacity)?;
        if occupancy.headroom() < 0 {
            ledger::report_over_capacity(&court.id, &slot.start_at, &slot.end_at, &occupancy);
        }
        listed.push(SlotAvailability {
            slot_ref: slot.slot_ref,
            start_at: slot.start_at,
            end_at: slot.end_at,
            capacity: occupancy.capacity,
            booked_players: occupancy.booked_players,
            headroom: occupancy.headroom().max(0),
        });
    }

    Ok(Json(SlotsResponse {
        court_id: court.id,
        court_name: court.name,
        venue_name: court.venue_name,
        date,
        is_active: court.is_active,
        price_per_hour: court.price_per_hour,
        slots: listed,
    }))
}

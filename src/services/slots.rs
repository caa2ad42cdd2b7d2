use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::BookingPolicy;
use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Court, ResolvedSlot, SlotKind, SlotRef, VirtualSlotKey};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratedSlot {
    pub slot_ref: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

// `court_id`, when given, must name the court the slot belongs to.
pub fn resolve(
    conn: &Connection,
    slot_ref: &str,
    court_id: Option<&str>,
    policy: &BookingPolicy,
) -> Result<ResolvedSlot, BookingError> {
    match SlotRef::parse(slot_ref.trim()) {
        SlotRef::Virtual(key) => resolve_virtual(conn, key, court_id, policy),
        SlotRef::Persisted(id) => resolve_persisted(conn, &id, court_id),
    }
}

fn resolve_virtual(
    conn: &Connection,
    key: VirtualSlotKey,
    court_id: Option<&str>,
    policy: &BookingPolicy,
) -> Result<ResolvedSlot, BookingError> {
    if let Some(expected) = court_id {
        if expected != key.court_id {
            return Err(BookingError::Validation(format!(
                "slot belongs to court {}, not {expected}",
                key.court_id
            )));
        }
    }

    let court = load_court(conn, &key.court_id)?;
    let minutes = court
        .slot_config
        .as_ref()
        .map(|c| c.duration_minutes(policy.default_slot_minutes))
        .unwrap_or(policy.default_slot_minutes);

    let start_at = key.start_at();
    let end_at = start_at + Duration::minutes(minutes);

    if let Some(config) = &court.slot_config {
        let (open, close) = config.window()?;
        let offset = (start_at.time() - open).num_minutes();
        let on_grid = offset >= 0
            && offset % minutes == 0
            && end_at.date() == key.date
            && end_at.time() <= close;
        if !on_grid {
            return Err(BookingError::Validation(format!(
                "{key} is not a bookable slot for this court"
            )));
        }
        if let Some(name) = config.excluded_by(start_at.time(), end_at.time()) {
            return Err(BookingError::Validation(format!(
                "slot overlaps the {name} window"
            )));
        }
    }

    if let Some(hours) = &court.operating_hours {
        if !hours.covers(&start_at, &end_at) {
            return Err(BookingError::Validation(format!(
                "slot is outside operating hours ({})",
                hours.to_human_readable()
            )));
        }
    }

    Ok(ResolvedSlot {
        slot_ref: key.to_string(),
        kind: SlotKind::Virtual,
        capacity: court.capacity,
        date: key.date,
        start_at,
        end_at,
        court,
    })
}

fn resolve_persisted(
    conn: &Connection,
    slot_id: &str,
    court_id: Option<&str>,
) -> Result<ResolvedSlot, BookingError> {
    let slot = queries::get_slot(conn, slot_id)?
        .ok_or_else(|| BookingError::NotFound(format!("slot {slot_id}")))?;

    if let Some(expected) = court_id {
        if expected != slot.court_id {
            return Err(BookingError::Validation(format!(
                "slot belongs to court {}, not {expected}",
                slot.court_id
            )));
        }
    }

    let court = load_court(conn, &slot.court_id)?;

    Ok(ResolvedSlot {
        slot_ref: slot.id.clone(),
        kind: SlotKind::Persisted {
            is_available: slot.is_available(),
            slot_id: slot.id,
        },
        capacity: slot.capacity.unwrap_or(court.capacity),
        date: slot.slot_date,
        start_at: slot.start_at,
        end_at: slot.end_at,
        court,
    })
}

fn load_court(conn: &Connection, court_id: &str) -> Result<Court, BookingError> {
    queries::get_court(conn, court_id)?
        .ok_or_else(|| BookingError::NotFound(format!("court {court_id}")))
}

// Courts without a slot configuration have no virtual slots.
pub fn generate_slots(court: &Court, date: NaiveDate, policy: &BookingPolicy) -> Vec<GeneratedSlot> {
    let Some(config) = &court.slot_config else {
        return vec![];
    };
    let Ok((open, close)) = config.window() else {
        return vec![];
    };
    let step = Duration::minutes(config.duration_minutes(policy.default_slot_minutes));
    let day_end = date.and_time(close);

    let mut slots = vec![];
    let mut start_at = date.and_time(open);
    while start_at + step <= day_end {
        let end_at = start_at + step;
        let excluded = config.excluded_by(start_at.time(), end_at.time()).is_some();
        let open_then = court
            .operating_hours
            .as_ref()
            .map(|h| h.covers(&start_at, &end_at))
            .unwrap_or(true);

        if !excluded && open_then {
            slots.push(GeneratedSlot {
                slot_ref: VirtualSlotKey {
                    court_id: court.id.clone(),
                    date,
                    start: start_at.time(),
                }
                .to_string(),
                start_at,
                end_at,
            });
        }
        start_at = end_at;
    }
    slots
}

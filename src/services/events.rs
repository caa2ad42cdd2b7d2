use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{BookingEvent, StoredEvent};
use crate::state::AppState;

/// Writes `event` to the outbox on `conn`. Call inside the transaction that
/// makes the state change it describes.
pub fn record(
    conn: &Connection,
    event: BookingEvent,
    now: &NaiveDateTime,
) -> Result<StoredEvent, BookingError> {
    let id = queries::insert_event(conn, &event, now)?;
    Ok(StoredEvent {
        id,
        created_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        event,
    })
}

pub fn announce(state: &Arc<AppState>, event: StoredEvent) {
    tracing::info!(event_id = event.id, kind = event.event.kind(), "booking event");
    // Broadcast to SSE subscribers; ignore if no receivers
    let _ = state.events_tx.send(event);
}

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use rusqlite::Connection;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::handlers::auth::{check_admin_token, require_admin};
use crate::models::StoredEvent;
use crate::state::AppState;

const CATCHUP_PAGE: i64 = 500;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub after: Option<i64>,
    pub limit: Option<i64>,
}

// GET /api/admin/events
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, AppError> {
    require_admin(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let db = state.db()?;
    let events = queries::get_events_after(&db, query.after.unwrap_or(0), limit).map_err(BookingError::from)?;
    Ok(Json(events))
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

// Reads the whole backlog after `last_id`, page by page.
fn catch_up(conn: &Connection, last_id: i64, page: i64) -> Result<Vec<StoredEvent>, BookingError> {
    let mut backlog = vec![];
    let mut cursor = last_id;
    loop {
        let batch = queries::get_events_after(conn, cursor, page)?;
        let full = batch.len() as i64 == page;
        if let Some(last) = batch.last() {
            cursor = last.id;
        }
        backlog.extend(batch);
        if !full {
            return Ok(backlog);
        }
    }
}

fn to_sse(event: &StoredEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .id(event.id.to_string())
        .event(event.event.kind())
        .data(data)
}

// GET /api/admin/events/stream (SSE)
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // EventSource can't set headers, so the token may come as a query param
    if require_admin(&headers, &state.config.admin_token).is_err() {
        check_admin_token(query.token.as_deref(), &state.config.admin_token)?;
    }

    // Subscribe before the catch-up read so nothing committed in between is lost.
    let rx = state.events_tx.subscribe();
    let last_id = query.last_id.unwrap_or(0);
    let catchup = {
        let db = state.db()?;
        catch_up(&db, last_id, CATCHUP_PAGE)?
    };
    let high_water = catchup.last().map(|e| e.id).unwrap_or(last_id);

    let catchup_stream = tokio_stream::iter(catchup.into_iter().map(|event| Ok::<_, Infallible>(to_sse(&event))));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.id > high_water => Some(Ok(to_sse(&event))),
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "event stream subscriber lagged");
            None
        }
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let combined = catchup_stream.chain(live_stream);
    let merged = StreamExt::merge(combined, keepalive_stream);

    Ok(Sse::new(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    use crate::db;
    use crate::models::BookingEvent;
    use crate::services::events;

    fn seed_events(conn: &Connection, count: usize) {
        let now = NaiveDateTime::parse_from_str("2025-08-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        for i in 0..count {
            events::record(
                conn,
                BookingEvent::BookingCancelled {
                    booking_id: format!("b{i}"),
                    user_id: "alice".to_string(),
                    reason: None,
                    refund_amount: 0,
                    payment_id: None,
                },
                &now,
            )
            .unwrap();
        }
    }

    #[test]
    fn test_catch_up_reads_past_one_page() {
        let conn = db::init_db(":memory:").unwrap();
        seed_events(&conn, 7);

        let backlog = catch_up(&conn, 0, 3).unwrap();
        let ids: Vec<i64> = backlog.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());

        let tail = catch_up(&conn, 5, 3).unwrap();
        assert_eq!(tail.iter().map(|e| e.id).collect::<Vec<_>>(), vec![6, 7]);
    }

    #[test]
    fn test_catch_up_backlog_larger_than_default_page() {
        let conn = db::init_db(":memory:").unwrap();
        seed_events(&conn, CATCHUP_PAGE as usize + 5);

        let backlog = catch_up(&conn, 0, CATCHUP_PAGE).unwrap();
        assert_eq!(backlog.len(), CATCHUP_PAGE as usize + 5);
        assert_eq!(backlog.last().unwrap().id, CATCHUP_PAGE + 5);

        assert!(catch_up(&conn, CATCHUP_PAGE + 5, CATCHUP_PAGE).unwrap().is_empty());
    }
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::handlers::auth::require_user;
use crate::handlers::bookings::load_owned;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

// GET /api/bookings/:id/calendar.ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = require_user(&state, &headers)?;
    let booking = load_owned(&state, &booking_id, &user_id)?;

    let court = {
        let db = state.db()?;
        queries::get_court(&db, &booking.court_id)
            .map_err(BookingError::from)?
            .ok_or_else(|| BookingError::NotFound(format!("court {}", booking.court_id)))?
    };

    let ics = generate_ics(&booking, &court);
    let disposition = format!("attachment; filename=\"{}.ics\"", booking.reference);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        ics,
    )
        .into_response())
}

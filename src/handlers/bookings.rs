use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::handlers::auth::require_user;
use crate::models::Booking;
use crate::services::admission::{self, AdmissionRequest, ConflictCheck};
use crate::services::intent::{self, PaymentIntent};
use crate::services::{cancellation, events};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct BookingRequest {
    pub slot_ref: String,
    pub court_id: Option<String>,
    pub player_count: i64,
    pub notes: Option<String>,
}

impl BookingRequest {
    fn into_admission(self, user_id: String) -> AdmissionRequest {
        AdmissionRequest {
            slot_ref: self.slot_ref,
            court_id: self.court_id,
            user_id,
            player_count: self.player_count,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

// POST /api/bookings/check
pub async fn check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BookingRequest>,
) -> Result<Json<ConflictCheck>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let req = body.into_admission(user_id);
    let policy = state.config.policy();
    let now = state.config.local_now();

    let db = state.db()?;
    Ok(Json(admission::check_conflict(&db, &req, &policy, &now)?))
}

#[derive(Serialize)]
pub struct IntentResponse {
    #[serde(flatten)]
    pub intent: PaymentIntent,
    pub headroom: i64,
}

// POST /api/bookings/intent
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BookingRequest>,
) -> Result<Json<IntentResponse>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let req = body.into_admission(user_id);
    let policy = state.config.policy();
    let now = state.config.local_now();

    let admitted = {
        let db = state.db()?;
        admission::admit(&db, &req, &policy, &now)?
    };

    let intent = intent::open(state.payments.as_ref(), &admitted, &policy, Utc::now()).await?;

    Ok(Json(IntentResponse {
        intent,
        headroom: admitted.headroom,
    }))
}

// GET /api/bookings
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let now = state.config.local_now();

    let db = state.db()?;
    let completed = queries::complete_elapsed_bookings(&db, &user_id, &now).map_err(BookingError::from)?;
    if completed > 0 {
        tracing::info!(user_id = %user_id, count = completed, "bookings completed");
    }
    let bookings = queries::get_bookings_for_user(&db, &user_id).map_err(BookingError::from)?;
    Ok(Json(bookings))
}

pub(crate) fn load_owned(state: &AppState, booking_id: &str, user_id: &str) -> Result<Booking, AppError> {
    let db = state.db()?;
    let booking = queries::get_booking_by_id(&db, booking_id)
        .map_err(BookingError::from)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
    if booking.user_id != user_id {
        return Err(BookingError::AccessDenied.into());
    }
    Ok(booking)
}

// GET /api/bookings/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let user_id = require_user(&state, &headers)?;
    Ok(Json(load_owned(&state, &id, &user_id)?))
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

// POST /api/bookings/:id/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let policy = state.config.policy();
    let now = state.config.local_now();

    let (booking, event) = {
        let mut db = state.db()?;
        cancellation::cancel(&mut db, &id, &user_id, body.reason.as_deref(), &policy, &now)?
    };
    events::announce(&state, event);

    Ok(Json(json!({ "booking": booking })))
}

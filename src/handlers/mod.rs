pub mod admin;
pub mod auth;
pub mod bookings;
pub mod calendar;
pub mod courts;
pub mod health;
pub mod payments;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/courts/:court_id/slots", get(courts::list_slots))
        .route("/api/bookings", get(bookings::list))
        .route("/api/bookings/check", post(bookings::check))
        .route("/api/bookings/intent", post(bookings::create_intent))
        .route("/api/bookings/:id", get(bookings::get))
        .route("/api/bookings/:id/cancel", post(bookings::cancel))
        .route("/api/bookings/:id/calendar.ics", get(calendar::download_ics))
        .route("/api/payments/verify", post(payments::verify))
        .route("/webhook/payments", post(payments::webhook))
        .route("/api/admin/events", get(admin::list_events))
        .route("/api/admin/events/stream", get(admin::events_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

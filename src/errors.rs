use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;
use serde_json::json;

// Everything except `Internal` is a recoverable rejection.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied")]
    AccessDenied,

    #[error("court is not accepting bookings")]
    CourtInactive,

    #[error("only {headroom} spots left, {requested} requested")]
    CapacityExceeded { requested: i64, headroom: i64 },

    #[error("you already hold a booking for this slot")]
    DuplicateBooking { booking_id: String },

    #[error("cancellation closed at {closed_at} for a booking starting {starts_at}")]
    CancellationWindowClosed {
        starts_at: NaiveDateTime,
        closed_at: NaiveDateTime,
    },

    #[error("booking is already cancelled")]
    AlreadyCancelled,

    #[error("completed bookings cannot be changed")]
    Immutable,

    #[error("payment signature is invalid")]
    InvalidSignature,

    #[error("slot no longer available, payment will be refunded")]
    RefundPending {
        order_id: String,
        reason_code: String,
        reason: String,
    },

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::NotFound(_) => "not_found",
            BookingError::AccessDenied => "access_denied",
            BookingError::CourtInactive => "court_inactive",
            BookingError::CapacityExceeded { .. } => "capacity_exceeded",
            BookingError::DuplicateBooking { .. } => "duplicate_booking",
            BookingError::CancellationWindowClosed { .. } => "cancellation_window_closed",
            BookingError::AlreadyCancelled => "already_cancelled",
            BookingError::Immutable => "immutable",
            BookingError::InvalidSignature => "invalid_signature",
            BookingError::RefundPending { .. } => "refund_pending",
            BookingError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) | BookingError::InvalidSignature => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::AccessDenied => StatusCode::FORBIDDEN,
            BookingError::CourtInactive
            | BookingError::CapacityExceeded { .. }
            | BookingError::DuplicateBooking { .. }
            | BookingError::CancellationWindowClosed { .. }
            | BookingError::AlreadyCancelled
            | BookingError::Immutable
            | BookingError::RefundPending { .. } => StatusCode::CONFLICT,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut body = json!({ "error": self.to_string(), "code": self.code() });
        match self {
            BookingError::CapacityExceeded { requested, headroom } => {
                body["requested"] = json!(requested);
                body["headroom"] = json!(headroom);
            }
            BookingError::DuplicateBooking { booking_id } => {
                body["booking_id"] = json!(booking_id);
            }
            BookingError::CancellationWindowClosed { starts_at, closed_at } => {
                body["starts_at"] = json!(starts_at.format("%Y-%m-%d %H:%M:%S").to_string());
                body["closed_at"] = json!(closed_at.format("%Y-%m-%d %H:%M:%S").to_string());
            }
            BookingError::RefundPending {
                order_id,
                reason_code,
                reason,
            } => {
                body["order_id"] = json!(order_id);
                body["refund"] = json!("pending");
                body["reason_code"] = json!(reason_code);
                body["reason"] = json!(reason);
            }
            _ => {}
        }
        body
    }
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Internal(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("authentication required")]
    Unauthenticated,

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Booking(BookingError::Internal(e)) => {
                tracing::error!(error = ?e, "booking core failure");
                internal_response()
            }
            AppError::Booking(e) => (e.status(), axum::Json(e.to_json())).into_response(),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({ "error": self.to_string(), "code": "unauthenticated" })),
            )
                .into_response(),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({ "error": self.to_string(), "code": "unauthorized" })),
            )
                .into_response(),
        }
    }
}

fn internal_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({ "error": "internal error", "code": "internal_error" })),
    )
        .into_response()
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingConfirmed {
        booking_id: String,
        reference: String,
        user_id: String,
        venue_name: String,
        court_name: String,
        start_at: String,
        end_at: String,
        total_price: i64,
        currency: String,
    },
    BookingCancelled {
        booking_id: String,
        user_id: String,
        reason: Option<String>,
        refund_amount: i64,
        payment_id: Option<String>,
    },
    RefundRequired {
        order_id: String,
        payment_id: String,
        user_id: String,
        amount: i64,
        currency: String,
        reason: String,
    },
}

impl BookingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BookingEvent::BookingConfirmed { .. } => "booking_confirmed",
            BookingEvent::BookingCancelled { .. } => "booking_cancelled",
            BookingEvent::RefundRequired { .. } => "refund_required",
        }
    }

    pub fn booking_id(&self) -> Option<&str> {
        match self {
            BookingEvent::BookingConfirmed { booking_id, .. }
            | BookingEvent::BookingCancelled { booking_id, .. } => Some(booking_id),
            BookingEvent::RefundRequired { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub created_at: String,
    #[serde(flatten)]
    pub event: BookingEvent,
}

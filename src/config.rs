use std::env;

use chrono::{Duration, FixedOffset, NaiveDateTime, Offset, Utc};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub payment_provider: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: String,
    pub currency: String,
    pub cancellation_window_minutes: i64,
    pub default_slot_minutes: i64,
    pub venue_utc_offset_minutes: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "courtbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            payment_provider: env::var("PAYMENT_PROVIDER").unwrap_or_else(|_| "sandbox".to_string()),
            razorpay_key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
            razorpay_key_secret: env::var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
            razorpay_webhook_secret: env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default(),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            cancellation_window_minutes: env::var("CANCELLATION_WINDOW_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            default_slot_minutes: env::var("DEFAULT_SLOT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(60),
            venue_utc_offset_minutes: env::var("VENUE_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    pub fn policy(&self) -> BookingPolicy {
        BookingPolicy {
            cancellation_window: Duration::minutes(self.cancellation_window_minutes),
            default_slot_minutes: self.default_slot_minutes,
            currency: self.currency.clone(),
        }
    }

    /// Wall-clock time at the venue. Booking intervals are stored in this frame.
    pub fn local_now(&self) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(self.venue_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset).naive_local()
    }
}

#[derive(Clone, Debug)]
pub struct BookingPolicy {
    pub cancellation_window: Duration,
    pub default_slot_minutes: i64,
    pub currency: String,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            cancellation_window: Duration::hours(2),
            default_slot_minutes: 60,
            currency: "INR".to_string(),
        }
    }
}

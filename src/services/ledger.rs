use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub booked_players: i64,
    pub capacity: i64,
}

impl Occupancy {
    pub fn headroom(&self) -> i64 {
        self.capacity - self.booked_players
    }
}

pub fn report_over_capacity(court_id: &str, start_at: &NaiveDateTime, end_at: &NaiveDateTime, occupancy: &Occupancy) {
    tracing::error!(
        court_id,
        start_at = %start_at,
        end_at = %end_at,
        booked_players = occupancy.booked_players,
        capacity = occupancy.capacity,
        "court interval is over capacity"
    );
}

/// Sum of players over the capacity-holding bookings intersecting
/// `[start, end)`.
pub fn tally(bookings: &[Booking], start: &NaiveDateTime, end: &NaiveDateTime) -> i64 {
    bookings
        .iter()
        .filter(|b| b.holds_capacity() && b.overlaps(start, end))
        .map(|b| b.player_count)
        .sum()
}

// Overlapping bookings for one court interval, read once.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub court_id: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub capacity: i64,
    pub bookings: Vec<Booking>,
}

impl LedgerSnapshot {
    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            booked_players: tally(&self.bookings, &self.start_at, &self.end_at),
            capacity: self.capacity,
        }
    }

    // Negative headroom fails closed until someone looks at the court.
    pub fn ensure_room_for(&self, requested: i64) -> Result<Occupancy, BookingError> {
        let occupancy = self.occupancy();
        let headroom = occupancy.headroom();
        if headroom < 0 {
            report_over_capacity(&self.court_id, &self.start_at, &self.end_at, &occupancy);
            return Err(BookingError::Internal(anyhow::anyhow!(
                "court {} is over capacity between {} and {}",
                self.court_id,
                self.start_at,
                self.end_at
            )));
        }
        if requested > headroom {
            return Err(BookingError::CapacityExceeded {
                requested,
                headroom,
            });
        }
        Ok(occupancy)
    }

    pub fn held_by(&self, user_id: &str) -> Option<&Booking> {
        self.bookings
            .iter()
            .find(|b| b.user_id == user_id && b.holds_capacity() && b.overlaps(&self.start_at, &self.end_at))
    }
}

pub fn snapshot(
    conn: &Connection,
    court_id: &str,
    start_at: &NaiveDateTime,
    end_at: &NaiveDateTime,
    capacity: i64,
) -> Result<LedgerSnapshot, BookingError> {
    let bookings = queries::get_overlapping_bookings(conn, court_id, start_at, end_at)?;
    Ok(LedgerSnapshot {
        court_id: court_id.to_string(),
        start_at: *start_at,
        end_at: *end_at,
        capacity,
        bookings,
    })
}

pub fn occupancy(
    conn: &Connection,
    court_id: &str,
    start_at: &NaiveDateTime,
    end_at: &NaiveDateTime,
    capacity: i64,
) -> Result<Occupancy, BookingError> {
    Ok(snapshot(conn, court_id, start_at, end_at, capacity)?.occupancy())
}

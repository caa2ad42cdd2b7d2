use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingEvent, BookingStatus, Court, OperatingHours, PaymentSnapshot, PaymentStatus,
    PersistedSlot, SlotConfig, SlotStatus, StoredEvent,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn fmt_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map_err(|e| anyhow::anyhow!("bad timestamp {s:?}: {e}"))
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| anyhow::anyhow!("bad date {s:?}: {e}"))
}

// ── Venues & Courts ──

pub fn insert_venue(conn: &Connection, id: &str, name: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO venues (id, name) VALUES (?1, ?2)",
        params![id, name],
    )?;
    Ok(())
}

pub fn insert_court(conn: &Connection, court: &Court) -> anyhow::Result<()> {
    let operating_hours = court
        .operating_hours
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let slot_config = court
        .slot_config
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO courts (id, venue_id, name, price_per_hour, capacity, is_active, operating_hours, slot_config)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            court.id,
            court.venue_id,
            court.name,
            court.price_per_hour,
            court.capacity,
            court.is_active as i32,
            operating_hours,
            slot_config,
        ],
    )?;
    Ok(())
}

pub fn get_court(conn: &Connection, id: &str) -> anyhow::Result<Option<Court>> {
    let row = conn
        .query_row(
            "SELECT c.id, c.venue_id, v.name, c.name, c.price_per_hour, c.capacity, c.is_active, c.operating_hours, c.slot_config
             FROM courts c JOIN venues v ON v.id = c.venue_id WHERE c.id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i32>(6)? != 0,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((id, venue_id, venue_name, name, price_per_hour, capacity, is_active, hours, config)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(Court {
        id,
        venue_id,
        venue_name,
        name,
        price_per_hour,
        capacity,
        is_active,
        operating_hours: hours.as_deref().map(OperatingHours::from_json).transpose()?,
        slot_config: config.as_deref().map(SlotConfig::from_json).transpose()?,
    }))
}

// ── Persisted Slots ──

pub fn insert_slot(conn: &Connection, slot: &PersistedSlot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO slots (id, court_id, slot_date, start_at, end_at, capacity, status, booked_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            slot.id,
            slot.court_id,
            slot.slot_date.format(DATE_FORMAT).to_string(),
            fmt_ts(&slot.start_at),
            fmt_ts(&slot.end_at),
            slot.capacity,
            slot.status.as_str(),
            slot.booked_count,
        ],
    )?;
    Ok(())
}

pub fn get_slot(conn: &Connection, id: &str) -> anyhow::Result<Option<PersistedSlot>> {
    let row = conn
        .query_row(
            "SELECT id, court_id, slot_date, start_at, end_at, capacity, status, booked_count FROM slots WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, court_id, slot_date, start_at, end_at, capacity, status, booked_count)) = row
    else {
        return Ok(None);
    };

    Ok(Some(PersistedSlot {
        id,
        court_id,
        slot_date: parse_date(&slot_date)?,
        start_at: parse_ts(&start_at)?,
        end_at: parse_ts(&end_at)?,
        capacity,
        status: SlotStatus::parse(&status),
        booked_count,
    }))
}

// Marks the slot booked once its capacity is exhausted.
pub fn record_slot_booking(conn: &Connection, slot_id: &str, exhausted: bool) -> anyhow::Result<()> {
    let status = if exhausted {
        SlotStatus::Booked
    } else {
        SlotStatus::Available
    };
    conn.execute(
        "UPDATE slots SET booked_count = booked_count + 1, status = ?1 WHERE id = ?2",
        params![status.as_str(), slot_id],
    )?;
    Ok(())
}

pub fn release_slot_booking(conn: &Connection, slot_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE slots SET booked_count = MAX(booked_count - 1, 0), status = ?1 WHERE id = ?2",
        params![SlotStatus::Available.as_str(), slot_id],
    )?;
    Ok(())
}

// ── Sessions ──

pub fn insert_session(
    conn: &Connection,
    token: &str,
    user_id: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, fmt_ts(expires_at)],
    )?;
    Ok(())
}

pub fn get_session_user(
    conn: &Connection,
    token: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<String>> {
    let user_id = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2",
            params![token, fmt_ts(now)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(user_id)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, reference, user_id, court_id, slot_id, slot_ref, booking_date, start_at, end_at, \
     duration_minutes, player_count, total_price, currency, notes, status, payment_status, payment_order_id, \
     payment_id, payment_amount, payment_method, paid_at, cancellation_reason, cancelled_at, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let payment = booking.payment.as_ref();
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
        ),
        params![
            booking.id,
            booking.reference,
            booking.user_id,
            booking.court_id,
            booking.slot_id,
            booking.slot_ref,
            booking.booking_date.format(DATE_FORMAT).to_string(),
            fmt_ts(&booking.start_at),
            fmt_ts(&booking.end_at),
            booking.duration_minutes,
            booking.player_count,
            booking.total_price,
            booking.currency,
            booking.notes,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            payment.map(|p| p.order_id.as_str()),
            payment.map(|p| p.payment_id.as_str()),
            payment.map(|p| p.amount),
            payment.and_then(|p| p.method.as_deref()),
            payment.map(|p| fmt_ts(&p.paid_at)),
            booking.cancellation_reason,
            booking.cancelled_at.as_ref().map(fmt_ts),
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Capacity-holding bookings on a court intersecting `[start, end)`.
pub fn get_overlapping_bookings(
    conn: &Connection,
    court_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE court_id = ?1 AND start_at < ?2 AND end_at > ?3 AND status IN ('pending', 'confirmed')
         ORDER BY start_at ASC"
    ))?;

    let rows = stmt.query_map(params![court_id, fmt_ts(end), fmt_ts(start)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY start_at DESC"
    ))?;

    let rows = stmt.query_map(params![user_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_order_id(conn: &Connection, order_id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_order_id = ?1"),
        params![order_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn mark_booking_cancelled(
    conn: &Connection,
    id: &str,
    reason: Option<&str>,
    payment_status: PaymentStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, payment_status = ?2, cancellation_reason = ?3, cancelled_at = ?4, updated_at = ?4
         WHERE id = ?5 AND status IN ('pending', 'confirmed')",
        params![
            BookingStatus::Cancelled.as_str(),
            payment_status.as_str(),
            reason,
            fmt_ts(now),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn complete_elapsed_bookings(
    conn: &Connection,
    user_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE user_id = ?3 AND status = ?4 AND end_at <= ?2",
        params![
            BookingStatus::Completed.as_str(),
            fmt_ts(now),
            user_id,
            BookingStatus::Confirmed.as_str(),
        ],
    )?;
    Ok(count)
}

pub fn reference_exists(conn: &Connection, reference: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE reference = ?1",
        params![reference],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let booking_date: String = row.get(6)?;
    let start_at: String = row.get(7)?;
    let end_at: String = row.get(8)?;
    let status: String = row.get(14)?;
    let payment_status: String = row.get(15)?;
    let order_id: Option<String> = row.get(16)?;
    let payment_id: Option<String> = row.get(17)?;
    let payment_amount: Option<i64> = row.get(18)?;
    let payment_method: Option<String> = row.get(19)?;
    let paid_at: Option<String> = row.get(20)?;
    let cancelled_at: Option<String> = row.get(22)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    let payment = match (order_id, payment_id, payment_amount, paid_at) {
        (Some(order_id), Some(payment_id), Some(amount), Some(paid_at)) => Some(PaymentSnapshot {
            order_id,
            payment_id,
            amount,
            method: payment_method,
            paid_at: parse_ts(&paid_at)?,
        }),
        _ => None,
    };

    Ok(Booking {
        id: row.get(0)?,
        reference: row.get(1)?,
        user_id: row.get(2)?,
        court_id: row.get(3)?,
        slot_id: row.get(4)?,
        slot_ref: row.get(5)?,
        booking_date: parse_date(&booking_date)?,
        start_at: parse_ts(&start_at)?,
        end_at: parse_ts(&end_at)?,
        duration_minutes: row.get(9)?,
        player_count: row.get(10)?,
        total_price: row.get(11)?,
        currency: row.get(12)?,
        notes: row.get(13)?,
        status: BookingStatus::parse(&status),
        payment_status: PaymentStatus::parse(&payment_status),
        payment,
        cancellation_reason: row.get(21)?,
        cancelled_at: cancelled_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Refund Claims ──

#[derive(Debug, Clone)]
pub struct RefundClaim {
    pub order_id: String,
    pub payment_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub reason_code: String,
    pub reason: String,
}

pub fn insert_refund_claim(
    conn: &Connection,
    claim: &RefundClaim,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO refund_claims (order_id, payment_id, user_id, amount, currency, reason_code, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            claim.order_id,
            claim.payment_id,
            claim.user_id,
            claim.amount,
            claim.currency,
            claim.reason_code,
            claim.reason,
            fmt_ts(now),
        ],
    )?;
    Ok(())
}

pub fn get_refund_claim(conn: &Connection, order_id: &str) -> anyhow::Result<Option<RefundClaim>> {
    let claim = conn
        .query_row(
            "SELECT order_id, payment_id, user_id, amount, currency, reason_code, reason FROM refund_claims WHERE order_id = ?1",
            params![order_id],
            |row| {
                Ok(RefundClaim {
                    order_id: row.get(0)?,
                    payment_id: row.get(1)?,
                    user_id: row.get(2)?,
                    amount: row.get(3)?,
                    currency: row.get(4)?,
                    reason_code: row.get(5)?,
                    reason: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(claim)
}

// ── Event Outbox ──

pub fn insert_event(
    conn: &Connection,
    event: &BookingEvent,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_events (kind, booking_id, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            event.kind(),
            event.booking_id(),
            serde_json::to_string(event)?,
            fmt_ts(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_events_after(
    conn: &Connection,
    after_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<StoredEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, payload, created_at FROM booking_events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![after_id, limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut events = vec![];
    for row in rows {
        let (id, payload, created_at) = row?;
        events.push(StoredEvent {
            id,
            created_at,
            event: serde_json::from_str(&payload)?,
        });
    }
    Ok(events)
}

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::court::Court;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotStatus {
    Available,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Booked => "booked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "booked" => SlotStatus::Booked,
            _ => SlotStatus::Available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSlot {
    pub id: String,
    pub court_id: String,
    pub slot_date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub capacity: Option<i64>,
    pub status: SlotStatus,
    pub booked_count: i64,
}

impl PersistedSlot {
    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }
}

// Decoded from the right, so the court id may contain hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualSlotKey {
    pub court_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
}

impl VirtualSlotKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.rsplitn(5, '-');
        let time = parts.next()?;
        let day = parts.next()?;
        let month = parts.next()?;
        let year = parts.next()?;
        let court_id = parts.next()?;

        if court_id.is_empty() || year.len() != 4 || month.len() != 2 || day.len() != 2 || time.len() != 5 {
            return None;
        }
        let date = NaiveDate::parse_from_str(&format!("{year}-{month}-{day}"), "%Y-%m-%d").ok()?;
        let start = NaiveTime::parse_from_str(time, "%H:%M").ok()?;

        Some(Self {
            court_id: court_id.to_string(),
            date,
            start,
        })
    }

    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start)
    }
}

impl fmt::Display for VirtualSlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.court_id,
            self.date.format("%Y-%m-%d"),
            self.start.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRef {
    Persisted(String),
    Virtual(VirtualSlotKey),
}

impl SlotRef {
    pub fn parse(raw: &str) -> Self {
        match VirtualSlotKey::parse(raw) {
            Some(key) => SlotRef::Virtual(key),
            None => SlotRef::Persisted(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SlotKind {
    Persisted { slot_id: String, is_available: bool },
    Virtual,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSlot {
    pub slot_ref: String,
    pub kind: SlotKind,
    pub court: Court,
    pub date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub capacity: i64,
}

impl ResolvedSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    // closed by status, whatever the occupancy
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, SlotKind::Persisted { is_available: false, .. })
    }

    pub fn persisted_slot_id(&self) -> Option<&str> {
        match &self.kind {
            SlotKind::Persisted { slot_id, .. } => Some(slot_id),
            SlotKind::Virtual => None,
        }
    }
}

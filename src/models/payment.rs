use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest value the processor accepts for a single order note.
pub const MAX_NOTE_LEN: usize = 256;

fn clip(value: &str) -> String {
    value.chars().take(MAX_NOTE_LEN).collect()
}

/// Everything needed to rebuild a booking from the payment order alone.
///
/// Written onto the order as processor metadata when the order is opened and
/// read back from the processor at commit time, never from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingContext {
    pub slot_ref: String,
    pub court_id: String,
    pub user_id: String,
    pub player_count: i64,
    pub notes: Option<String>,
    pub venue_name: String,
    pub court_name: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub amount: i64,
}

impl BookingContext {
    pub fn is_booking_order(notes: &BTreeMap<String, String>) -> bool {
        notes.contains_key("slot_ref") || notes.contains_key("user_id")
    }

    pub fn to_notes(&self) -> BTreeMap<String, String> {
        let mut notes = BTreeMap::new();
        notes.insert("slot_ref".to_string(), self.slot_ref.clone());
        notes.insert("court_id".to_string(), self.court_id.clone());
        notes.insert("user_id".to_string(), self.user_id.clone());
        notes.insert("player_count".to_string(), self.player_count.to_string());
        if let Some(n) = &self.notes {
            notes.insert("notes".to_string(), clip(n));
        }
        notes.insert("venue_name".to_string(), clip(&self.venue_name));
        notes.insert("court_name".to_string(), clip(&self.court_name));
        notes.insert("start_at".to_string(), self.start_at.format(TS_FORMAT).to_string());
        notes.insert("end_at".to_string(), self.end_at.format(TS_FORMAT).to_string());
        notes.insert("amount".to_string(), self.amount.to_string());
        notes
    }

    pub fn from_notes(notes: &BTreeMap<String, String>) -> anyhow::Result<Self> {
        let field = |key: &str| -> anyhow::Result<&String> {
            notes
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("order metadata is missing {key}"))
        };
        let timestamp = |key: &str| -> anyhow::Result<NaiveDateTime> {
            NaiveDateTime::parse_from_str(field(key)?, TS_FORMAT)
                .map_err(|e| anyhow::anyhow!("order metadata has a bad {key}: {e}"))
        };

        Ok(Self {
            slot_ref: field("slot_ref")?.clone(),
            court_id: field("court_id")?.clone(),
            user_id: field("user_id")?.clone(),
            player_count: field("player_count")?.parse()?,
            notes: notes.get("notes").cloned(),
            venue_name: field("venue_name")?.clone(),
            court_name: field("court_name")?.clone(),
            start_at: timestamp("start_at")?,
            end_at: timestamp("end_at")?,
            amount: field("amount")?.parse()?,
        })
    }
}

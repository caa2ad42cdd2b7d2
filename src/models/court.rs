use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::availability::{parse_time, OperatingHours};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Court {
    pub id: String,
    pub venue_id: String,
    pub venue_name: String,
    pub name: String,
    pub price_per_hour: i64,
    pub capacity: i64,
    pub is_active: bool,
    pub operating_hours: Option<OperatingHours>,
    pub slot_config: Option<SlotConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    pub start_time: String,
    pub end_time: String,
    pub slot_duration_minutes: Option<i64>,
    #[serde(default)]
    pub excluded_ranges: Vec<ExcludedRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedRange {
    pub name: String,
    pub start: String,
    pub end: String,
}

impl SlotConfig {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let config: SlotConfig = serde_json::from_str(s)?;
        let start = parse_time(&config.start_time)?;
        let end = parse_time(&config.end_time)?;
        if end <= start {
            anyhow::bail!("slot window ends before it starts");
        }
        if let Some(minutes) = config.slot_duration_minutes {
            if minutes <= 0 {
                anyhow::bail!("slot duration must be positive, got {minutes}");
            }
        }
        for range in &config.excluded_ranges {
            parse_time(&range.start)?;
            parse_time(&range.end)?;
        }
        Ok(config)
    }

    pub fn duration_minutes(&self, default_minutes: i64) -> i64 {
        self.slot_duration_minutes.unwrap_or(default_minutes)
    }

    pub fn window(&self) -> anyhow::Result<(NaiveTime, NaiveTime)> {
        Ok((parse_time(&self.start_time)?, parse_time(&self.end_time)?))
    }

    pub fn excluded_by(&self, start: NaiveTime, end: NaiveTime) -> Option<&str> {
        self.excluded_ranges.iter().find_map(|range| {
            let (Ok(from), Ok(to)) = (parse_time(&range.start), parse_time(&range.end)) else {
                return None;
            };
            (from < end && to > start).then_some(range.name.as_str())
        })
    }
}

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// {"day":"mon","open":"06:00","close":"22:00"}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningWindow {
    pub day: String,
    pub open: String,
    pub close: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperatingHours {
    pub windows: Vec<OpeningWindow>,
}

impl OperatingHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: OperatingHours = serde_json::from_str(s)?;
        for window in &hours.windows {
            parse_weekday(&window.day)?;
            let open = parse_time(&window.open)?;
            let close = parse_time(&window.close)?;
            if close <= open {
                anyhow::bail!("window closes before it opens: {}-{}", window.open, window.close);
            }
        }
        Ok(hours)
    }

    /// Whether `[start, end)` fits entirely inside one opening window on the
    /// weekday of `start`. An empty schedule places no restriction.
    pub fn covers(&self, start: &NaiveDateTime, end: &NaiveDateTime) -> bool {
        if self.windows.is_empty() {
            return true;
        }
        if start.date() != end.date() {
            return false;
        }

        let weekday = start.weekday();
        self.windows.iter().any(|w| {
            let (Ok(day), Ok(open), Ok(close)) =
                (parse_weekday(&w.day), parse_time(&w.open), parse_time(&w.close))
            else {
                return false;
            };
            day == weekday && start.time() >= open && end.time() <= close
        })
    }

    pub fn to_human_readable(&self) -> String {
        let mut sorted = self.windows.clone();
        sorted.sort_by_key(|w| {
            parse_weekday(&w.day)
                .map(|d| d.num_days_from_monday())
                .unwrap_or(7)
        });

        sorted
            .iter()
            .map(|w| format!("{}: {}-{}", capitalize(&w.day), w.open, w.close))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

pub(crate) fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time: {s}"))
}

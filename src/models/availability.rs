use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::slot::{parse_clock, SlotTime};

/// Declared weekly availability as embedded in a consultancy record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsultancyAvailability {
    pub days: Vec<String>,
    pub hours: String,
}

/// Parsed availability: working weekdays in Mon–Sun order and the half-open
/// hour range `[open, close)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingHours {
    days: Vec<Weekday>,
    open: u32,
    close: u32,
}

impl ConsultancyAvailability {
    pub fn parse(&self) -> anyhow::Result<WorkingHours> {
        let mut days = Vec::with_capacity(self.days.len());
        for day in &self.days {
            let weekday = Weekday::from_str(day.trim())
                .map_err(|_| anyhow::anyhow!("invalid weekday: {day}"))?;
            if !days.contains(&weekday) {
                days.push(weekday);
            }
        }
        days.sort_by_key(|d| d.num_days_from_monday());

        let (start, end) = self
            .hours
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("invalid hours range: {}", self.hours))?;
        let (start_hour, start_minute) = parse_clock(start)
            .ok_or_else(|| anyhow::anyhow!("invalid opening time: {}", start.trim()))?;
        let (end_hour, end_minute) = parse_clock(end)
            .ok_or_else(|| anyhow::anyhow!("invalid closing time: {}", end.trim()))?;

        // A slot may not start before opening, so a partial first hour is skipped.
        let open = if start_minute > 0 { start_hour + 1 } else { start_hour };
        // "12:00 AM" as a closing time means end of day.
        let close = if end_hour == 0 && end_minute == 0 { 24 } else { end_hour };

        if close <= open {
            return Err(anyhow::anyhow!("hours range has no bookable slots: {}", self.hours));
        }

        Ok(WorkingHours { days, open, close })
    }
}

impl WorkingHours {
    pub fn works_on(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday())
    }

    /// Every hourly slot in the working range, independent of date.
    pub fn day_slots(&self) -> Vec<SlotTime> {
        (self.open..self.close).filter_map(SlotTime::from_hour).collect()
    }

    /// Slots that can be offered for `date` as of `now`. Non-working days and
    /// past dates yield nothing; for today only hours strictly after the
    /// current hour remain.
    pub fn offerable_slots(&self, date: NaiveDate, now: NaiveDateTime) -> Vec<SlotTime> {
        if !self.works_on(date) || date < now.date() {
            return Vec::new();
        }
        let slots = self.day_slots();
        if date == now.date() {
            let current_hour = now.hour();
            return slots.into_iter().filter(|s| s.hour() > current_hour).collect();
        }
        slots
    }

    pub fn day_names(&self) -> Vec<&'static str> {
        self.days.iter().map(|d| weekday_name(*d)).collect()
    }

    pub fn hours_label(&self) -> String {
        let open = SlotTime::from_hour(self.open).map(|s| s.label()).unwrap_or_default();
        let close = if self.close == 24 {
            "12:00 AM".to_string()
        } else {
            SlotTime::from_hour(self.close).map(|s| s.label()).unwrap_or_default()
        };
        format!("{open} - {close}")
    }

    pub fn to_human_readable(&self) -> String {
        if self.days.is_empty() {
            return String::new();
        }
        format!("{}, {}", self.day_names().join(", "), self.hours_label())
    }

    /// First working day strictly after `after`, within the next week.
    pub fn next_working_date(&self, after: NaiveDate) -> Option<NaiveDate> {
        (1..=7)
            .map(|offset| after + Duration::days(offset))
            .find(|d| self.works_on(*d))
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

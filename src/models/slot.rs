use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// On-the-hour 12-hour input such as "10:00 AM" or "10:00am".
static SLOT_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(1[0-2]|0?[1-9]):00\s*(am|pm)$").expect("valid slot input regex")
});

static CLOCK_12H_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(1[0-2]|0?[1-9]):([0-5]\d)\s*(am|pm)$").expect("valid 12-hour clock regex")
});

static CLOCK_24H_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)(?::[0-5]\d)?$").expect("valid 24-hour clock regex")
});

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid ISO date regex"));

static DMY_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid DD/MM/YYYY regex"));

/// A bookable slot start, always on the hour. Slots are exactly 60 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(u32);

impl SlotTime {
    pub fn from_hour(hour: u32) -> Option<Self> {
        (hour < 24).then_some(SlotTime(hour))
    }

    pub fn hour(self) -> u32 {
        self.0
    }

    /// Parses user input. Only on-the-hour 12-hour times are accepted; case
    /// and spacing around the meridiem are normalized.
    pub fn parse_input(input: &str) -> Option<Self> {
        let caps = SLOT_INPUT_RE.captures(input.trim())?;
        let hour: u32 = caps[1].parse().ok()?;
        let pm = caps[2].eq_ignore_ascii_case("pm");
        Some(SlotTime(to_24_hour(hour, pm)))
    }

    /// Normalizes a stored time, which may have been written in 12-hour or
    /// 24-hour form. Returns `None` for values that are not on the hour.
    pub fn normalize(stored: &str) -> Option<Self> {
        match parse_clock(stored)? {
            (hour, 0) => Some(SlotTime(hour)),
            _ => None,
        }
    }

    pub fn label(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hour, meridiem) = match self.0 {
            0 => (12, "AM"),
            h @ 1..=11 => (h, "AM"),
            12 => (12, "PM"),
            h => (h - 12, "PM"),
        };
        write!(f, "{hour}:00 {meridiem}")
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SlotTime::normalize(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid slot time: {raw}")))
    }
}

fn to_24_hour(hour: u32, pm: bool) -> u32 {
    match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    }
}

/// Parses a wall-clock time in either "9:30 AM" or "09:30" form into
/// (24-hour hour, minute).
pub fn parse_clock(input: &str) -> Option<(u32, u32)> {
    let input = input.trim();
    if let Some(caps) = CLOCK_12H_RE.captures(input) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let pm = caps[3].eq_ignore_ascii_case("pm");
        return Some((to_24_hour(hour, pm), minute));
    }
    let caps = CLOCK_24H_RE.captures(input)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Strict `YYYY-MM-DD`, used for booking input.
pub fn parse_booking_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if !ISO_DATE_RE.is_match(input) {
        return None;
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()
}

/// `YYYY-MM-DD` or `DD/MM/YYYY`, used by the booked-times lookup.
pub fn parse_query_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if DMY_DATE_RE.is_match(input) {
        return NaiveDate::parse_from_str(input, "%d/%m/%Y").ok();
    }
    parse_booking_date(input)
}

/// Reduces a stored appointment date to its calendar day. Accepts a bare
/// date, a `YYYY-MM-DD HH:MM:SS` timestamp or an RFC 3339 timestamp.
pub fn normalize_stored_date(stored: &str) -> Option<NaiveDate> {
    let stored = stored.trim();
    let day = stored.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_accepts_on_the_hour() {
        assert_eq!(SlotTime::parse_input("10:00 AM"), SlotTime::from_hour(10));
        assert_eq!(SlotTime::parse_input("10:00am"), SlotTime::from_hour(10));
        assert_eq!(SlotTime::parse_input("  3:00   pm "), SlotTime::from_hour(15));
        assert_eq!(SlotTime::parse_input("09:00 AM"), SlotTime::from_hour(9));
    }

    #[test]
    fn test_parse_input_rejects_half_hours_and_24h() {
        assert!(SlotTime::parse_input("10:30 AM").is_none());
        assert!(SlotTime::parse_input("14:00").is_none());
        assert!(SlotTime::parse_input("10 AM").is_none());
        assert!(SlotTime::parse_input("13:00 PM").is_none());
    }

    #[test]
    fn test_noon_and_midnight() {
        assert_eq!(SlotTime::parse_input("12:00 PM").unwrap().hour(), 12);
        assert_eq!(SlotTime::parse_input("12:00 AM").unwrap().hour(), 0);
        assert_eq!(SlotTime::from_hour(0).unwrap().label(), "12:00 AM");
        assert_eq!(SlotTime::from_hour(12).unwrap().label(), "12:00 PM");
        assert_eq!(SlotTime::from_hour(17).unwrap().label(), "5:00 PM");
    }

    #[test]
    fn test_normalize_stored_24_hour() {
        assert_eq!(SlotTime::normalize("14:00").unwrap().label(), "2:00 PM");
        assert_eq!(SlotTime::normalize("09:00:00").unwrap().label(), "9:00 AM");
        assert_eq!(SlotTime::normalize("10:00 AM").unwrap().label(), "10:00 AM");
        assert!(SlotTime::normalize("14:30").is_none());
    }

    #[test]
    fn test_parse_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(parse_booking_date("2024-06-10"), Some(expected));
        assert_eq!(parse_booking_date("10/06/2024"), None);
        assert_eq!(parse_booking_date("2024-6-10"), None);
        assert_eq!(parse_booking_date("2024-02-30"), None);
        assert_eq!(parse_query_date("10/06/2024"), Some(expected));
        assert_eq!(parse_query_date("2024-06-10"), Some(expected));
    }

    #[test]
    fn test_normalize_stored_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(normalize_stored_date("2024-06-10 00:00:00"), Some(expected));
        assert_eq!(normalize_stored_date("2024-06-10T00:00:00.000Z"), Some(expected));
        assert_eq!(normalize_stored_date("2024-06-10"), Some(expected));
        assert_eq!(normalize_stored_date("junk"), None);
    }
}

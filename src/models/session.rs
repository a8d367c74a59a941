use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::appointment::AppointmentType;
use super::slot::SlotTime;

const MAX_HISTORY: usize = 20;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9\s\-().]{6,19}$").expect("valid phone regex"));

/// The consultancy a chat booking is being made with, captured when the user
/// names it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultancyRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    #[error("expected exactly three details (name, email, phone), got {0}")]
    WrongPartCount(usize),
    #[error("name, email and phone must all be filled in")]
    EmptyPart,
    #[error("\"{0}\" is not a valid email address")]
    InvalidEmail(String),
    #[error("\"{0}\" is not a valid phone number")]
    InvalidPhone(String),
}

impl ContactDetails {
    /// Parses "name, email, phone" given on one line or across lines.
    pub fn parse(input: &str) -> Result<Self, ContactError> {
        let parts: Vec<&str> = input.trim().split([',', '\n']).map(str::trim).collect();
        let [name, email, phone] = parts.as_slice() else {
            return Err(ContactError::WrongPartCount(parts.len()));
        };
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ContactError::EmptyPart);
        }
        if !EMAIL_RE.is_match(email) {
            return Err(ContactError::InvalidEmail(email.to_string()));
        }
        if !PHONE_RE.is_match(phone) {
            return Err(ContactError::InvalidPhone(phone.to_string()));
        }
        Ok(ContactDetails {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
        })
    }
}

/// Where a chat booking currently stands. Each state carries exactly the data
/// collected so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BookingStep {
    #[default]
    Idle,
    AwaitingDate {
        consultancy: ConsultancyRef,
    },
    AwaitingTime {
        consultancy: ConsultancyRef,
        date: NaiveDate,
    },
    AwaitingMode {
        consultancy: ConsultancyRef,
        date: NaiveDate,
        time: SlotTime,
    },
    AwaitingContact {
        consultancy: ConsultancyRef,
        date: NaiveDate,
        time: SlotTime,
        mode: AppointmentType,
    },
    AwaitingPayment {
        consultancy: ConsultancyRef,
        date: NaiveDate,
        time: SlotTime,
        mode: AppointmentType,
        contact: ContactDetails,
    },
}

impl BookingStep {
    /// 0 = idle, 1..=5 = date, time, mode, contact, payment.
    pub fn index(&self) -> u8 {
        match self {
            BookingStep::Idle => 0,
            BookingStep::AwaitingDate { .. } => 1,
            BookingStep::AwaitingTime { .. } => 2,
            BookingStep::AwaitingMode { .. } => 3,
            BookingStep::AwaitingContact { .. } => 4,
            BookingStep::AwaitingPayment { .. } => 5,
        }
    }

    pub fn consultancy(&self) -> Option<&ConsultancyRef> {
        match self {
            BookingStep::Idle => None,
            BookingStep::AwaitingDate { consultancy }
            | BookingStep::AwaitingTime { consultancy, .. }
            | BookingStep::AwaitingMode { consultancy, .. }
            | BookingStep::AwaitingContact { consultancy, .. }
            | BookingStep::AwaitingPayment { consultancy, .. } => Some(consultancy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: Option<String>,
    pub step: BookingStep,
    pub history: Vec<ChatMessage>,
    pub last_activity: NaiveDateTime,
}

impl ChatSession {
    pub fn new(session_id: String, user_id: Option<String>) -> Self {
        Self {
            session_id,
            user_id,
            step: BookingStep::Idle,
            history: Vec::new(),
            last_activity: Utc::now().naive_utc(),
        }
    }

    /// Identity appointments from this session are booked under. Anonymous
    /// sessions book as a guest tied to the session.
    pub fn client_id(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| format!("guest-{}", self.session_id))
    }

    pub fn push(&mut self, role: &str, content: &str) {
        self.history.push(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    pub fn expires_at(&self, ttl: Duration) -> NaiveDateTime {
        self.last_activity + ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_parse_comma_separated() {
        let contact =
            ContactDetails::parse("Jane Doe, jane@example.com, +1 555-123-4567").unwrap();
        assert_eq!(contact.name, "Jane Doe");
        assert_eq!(contact.email, "jane@example.com");
        assert_eq!(contact.phone, "+1 555-123-4567");
    }

    #[test]
    fn test_contact_parse_newline_separated() {
        let contact = ContactDetails::parse("Jane Doe\njane@example.com\n9876543210").unwrap();
        assert_eq!(contact.phone, "9876543210");
    }

    #[test]
    fn test_contact_parse_failures() {
        assert_eq!(
            ContactDetails::parse("Jane Doe, jane@example.com"),
            Err(ContactError::WrongPartCount(2))
        );
        assert!(matches!(
            ContactDetails::parse("Jane, not-an-email, 9876543210"),
            Err(ContactError::InvalidEmail(_))
        ));
        assert!(matches!(
            ContactDetails::parse("Jane, jane@example.com, 12ab"),
            Err(ContactError::InvalidPhone(_))
        ));
        assert!(matches!(
            ContactDetails::parse("Jane, jane@example.com, 123"),
            Err(ContactError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_contact_parse_rejects_empty_parts() {
        assert_eq!(
            ContactDetails::parse("Jane,, jane@example.com, 5551234567"),
            Err(ContactError::WrongPartCount(4))
        );
        assert_eq!(
            ContactDetails::parse(" , jane@example.com, 5551234567"),
            Err(ContactError::EmptyPart)
        );
        assert_eq!(
            ContactDetails::parse("Jane Doe\n\njane@example.com"),
            Err(ContactError::EmptyPart)
        );
    }

    #[test]
    fn test_step_index() {
        assert_eq!(BookingStep::Idle.index(), 0);
        let consultancy = ConsultancyRef {
            id: "c1".to_string(),
            name: "Acme".to_string(),
        };
        assert_eq!(BookingStep::AwaitingDate { consultancy }.index(), 1);
    }

    #[test]
    fn test_step_serde_round_trip_keeps_fields() {
        let step = BookingStep::AwaitingMode {
            consultancy: ConsultancyRef {
                id: "c1".to_string(),
                name: "Acme".to_string(),
            },
            date: NaiveDate::from_ymd_opt(2025, 6, 18).unwrap(),
            time: SlotTime::from_hour(9).unwrap(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["state"], "awaiting_mode");
        assert_eq!(json["time"], "9:00 AM");
        let back: BookingStep = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = ChatSession::new("s1".to_string(), None);
        for i in 0..30 {
            session.push("user", &format!("message {i}"));
        }
        assert_eq!(session.history.len(), MAX_HISTORY);
        assert_eq!(session.history[0].content, "message 10");
        assert_eq!(session.client_id(), "guest-s1");
    }
}

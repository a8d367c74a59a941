use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::slot::SlotTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub consultancy_id: String,
    /// Copied from the consultancy at booking time. Not refreshed if the
    /// consultancy is renamed later.
    pub consultancy_name: String,
    pub client_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    /// Local midnight of the booked day.
    pub appointment_date: NaiveDateTime,
    /// As stored; older rows may hold a 24-hour value. Use [`Appointment::slot_time`].
    pub appointment_time: String,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub meeting_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Appointment {
    pub fn slot_date(&self) -> NaiveDate {
        self.appointment_date.date()
    }

    pub fn slot_time(&self) -> Option<SlotTime> {
        SlotTime::normalize(&self.appointment_time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Expired,
}

/// Which side of the appointment is acting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Client,
    Consultant,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("an appointment cannot move from {from} to {to}")]
    Invalid { from: &'static str, to: &'static str },
    #[error("only the consultancy can mark an appointment as {to}")]
    ConsultantOnly { to: &'static str },
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Some(AppointmentStatus::Cancelled),
            "expired" => Some(AppointmentStatus::Expired),
            _ => None,
        }
    }

    /// Pending and confirmed appointments occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    /// User-driven transitions. Expiry is time-driven and never goes through here.
    pub fn check_transition(
        &self,
        to: AppointmentStatus,
        actor: Party,
    ) -> Result<(), TransitionError> {
        use AppointmentStatus::*;
        match (self, to) {
            (Pending, Confirmed) | (Confirmed, Completed) => match actor {
                Party::Consultant => Ok(()),
                Party::Client => Err(TransitionError::ConsultantOnly { to: to.as_str() }),
            },
            (Pending | Confirmed, Cancelled) => Ok(()),
            _ => Err(TransitionError::Invalid {
                from: self.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentType {
    Online,
    Offline,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Online => "online",
            AppointmentType::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "online" => Some(AppointmentType::Online),
            "offline" => Some(AppointmentType::Offline),
            _ => None,
        }
    }

    /// Loose match on free text, e.g. "online please".
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        if text.contains("offline") {
            Some(AppointmentType::Offline)
        } else if text.contains("online") {
            Some(AppointmentType::Online)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Upi,
    Paypal,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] =
        [PaymentMethod::Card, PaymentMethod::Upi, PaymentMethod::Paypal];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

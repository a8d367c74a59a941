use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::availability::ConsultancyAvailability;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultancy {
    pub id: String,
    pub name: String,
    /// Identity of the consultant who manages this consultancy.
    pub owner_id: String,
    pub status: VerificationStatus,
    pub availability: ConsultancyAvailability,
    /// Session fee in minor currency units.
    pub fee_cents: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Consultancy {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "verified" => VerificationStatus::Verified,
            "rejected" => VerificationStatus::Rejected,
            _ => VerificationStatus::Pending,
        }
    }
}

pub fn format_fee(fee_cents: i64) -> String {
    format!("{}.{:02}", fee_cents / 100, (fee_cents % 100).abs())
}

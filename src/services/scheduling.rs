use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::ConflictScope;
use crate::db::queries;
use crate::models::availability::weekday_name;
use crate::models::slot::{parse_booking_date, SlotTime};
use crate::models::{Consultancy, WorkingHours};
use crate::services::conflict::{self, Occupant};

/// Number of alternative slots proposed after a conflict.
const MAX_ALTERNATIVES: usize = 3;

/// Why a booking attempt was turned down. These are expected outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    ConsultancyNotFound,
    UnderVerification {
        name: String,
    },
    NoAvailability {
        name: String,
    },
    InvalidDate {
        input: String,
    },
    InvalidTime {
        input: String,
    },
    DateNotInFuture {
        date: NaiveDate,
        next_available: Option<NaiveDate>,
    },
    DayUnavailable {
        date: NaiveDate,
        available_days: Vec<&'static str>,
        next_available: Option<NaiveDate>,
    },
    SlotUnavailable {
        time: SlotTime,
        hours: String,
        open_slots: Vec<SlotTime>,
    },
    Conflict {
        conflicts: Vec<String>,
        free_slots: Vec<SlotTime>,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ConsultancyNotFound => {
                write!(f, "We couldn't find that consultancy.")
            }
            Rejection::UnderVerification { name } => write!(
                f,
                "{name} is still under verification and can't accept bookings yet. \
                 Please check back once it has been verified."
            ),
            Rejection::NoAvailability { name } => write!(
                f,
                "{name} hasn't published its working hours yet, so no slots can be booked."
            ),
            Rejection::InvalidDate { input } => write!(
                f,
                "\"{input}\" is not a valid date. \
                 Please use the format YYYY-MM-DD, for example 2025-06-18."
            ),
            Rejection::InvalidTime { input } => write!(
                f,
                "\"{input}\" is not a valid time. \
                 Please pick an on-the-hour time such as 10:00 AM or 3:00 PM."
            ),
            Rejection::DateNotInFuture { date, .. } => write!(
                f,
                "Appointments must be booked for a future date, and {} is not after today. \
                 Please choose a later date.",
                date.format("%Y-%m-%d")
            ),
            Rejection::DayUnavailable { date, available_days, .. } => {
                write!(
                    f,
                    "The consultancy is not available on {}s. Available days: {}.",
                    weekday_name(chrono::Datelike::weekday(date)),
                    available_days.join(", ")
                )
            }
            Rejection::SlotUnavailable { time, hours, .. } => {
                write!(f, "{time} is not an available slot. Working hours are {hours}.")
            }
            Rejection::Conflict { conflicts, .. } => {
                write!(f, "That time slot is already taken: {}.", conflicts.join("; "))
            }
        }
    }
}

/// Structured validation result returned to the UI and chat callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_slots: Vec<String>,
    #[serde(skip)]
    pub rejection: Option<Rejection>,
}

impl ValidationOutcome {
    pub fn rejected(rejection: Rejection) -> Self {
        let labels = |slots: &[SlotTime]| slots.iter().map(|s| s.label()).collect::<Vec<_>>();
        let next_date = |d: &Option<NaiveDate>| {
            d.map(|d| format!("Next available date: {}", d.format("%Y-%m-%d")))
        };

        let (conflicts, suggestions, available_slots) = match &rejection {
            Rejection::DateNotInFuture { next_available, .. } => {
                (Vec::new(), next_date(next_available).into_iter().collect(), Vec::new())
            }
            Rejection::DayUnavailable { available_days, next_available, .. } => {
                let mut suggestions: Vec<String> =
                    available_days.iter().map(|d| d.to_string()).collect();
                suggestions.extend(next_date(next_available));
                (Vec::new(), suggestions, Vec::new())
            }
            Rejection::SlotUnavailable { open_slots, .. } => {
                let all = labels(open_slots);
                let first = all.iter().take(MAX_ALTERNATIVES).cloned().collect();
                (Vec::new(), first, all)
            }
            Rejection::Conflict { conflicts, free_slots } => {
                let all = labels(free_slots);
                let first = all.iter().take(MAX_ALTERNATIVES).cloned().collect();
                (conflicts.clone(), first, all)
            }
            _ => (Vec::new(), Vec::new(), Vec::new()),
        };

        Self {
            is_valid: false,
            message: Some(rejection.to_string()),
            conflicts,
            suggestions,
            available_slots,
            rejection: Some(rejection),
        }
    }

    pub fn reason(&self) -> String {
        self.message.clone().unwrap_or_default()
    }
}

/// A candidate slot as submitted, before any parsing.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    pub consultancy_id: &'a str,
    pub client_id: &'a str,
    pub date: &'a str,
    pub time: &'a str,
}

/// A slot that passed every check.
#[derive(Debug, Clone)]
pub struct AcceptedSlot {
    pub consultancy: Consultancy,
    pub date: NaiveDate,
    pub time: SlotTime,
}

// ── Individual checks, shared by the chat flow ──

pub fn check_bookable(consultancy: Option<Consultancy>) -> Result<Consultancy, Rejection> {
    let consultancy = consultancy.ok_or(Rejection::ConsultancyNotFound)?;
    if !consultancy.is_verified() {
        return Err(Rejection::UnderVerification {
            name: consultancy.name,
        });
    }
    Ok(consultancy)
}

pub fn working_hours(consultancy: &Consultancy) -> Result<WorkingHours, Rejection> {
    consultancy.availability.parse().map_err(|e| {
        tracing::warn!(
            consultancy_id = %consultancy.id,
            error = %e,
            "consultancy has unusable availability"
        );
        Rejection::NoAvailability {
            name: consultancy.name.clone(),
        }
    })
}

pub fn parse_date(input: &str) -> Result<NaiveDate, Rejection> {
    parse_booking_date(input).ok_or_else(|| Rejection::InvalidDate {
        input: input.trim().to_string(),
    })
}

pub fn parse_time(input: &str) -> Result<SlotTime, Rejection> {
    SlotTime::parse_input(input).ok_or_else(|| Rejection::InvalidTime {
        input: input.trim().to_string(),
    })
}

/// Same-day booking is never allowed.
pub fn check_future(
    hours: &WorkingHours,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Result<(), Rejection> {
    let today = now.date();
    if date <= today {
        return Err(Rejection::DateNotInFuture {
            date,
            next_available: hours.next_working_date(today),
        });
    }
    Ok(())
}

pub fn check_day(hours: &WorkingHours, date: NaiveDate) -> Result<(), Rejection> {
    if !hours.works_on(date) {
        return Err(Rejection::DayUnavailable {
            date,
            available_days: hours.day_names(),
            next_available: hours.next_working_date(date),
        });
    }
    Ok(())
}

pub fn check_slot(
    hours: &WorkingHours,
    date: NaiveDate,
    time: SlotTime,
    now: NaiveDateTime,
) -> Result<(), Rejection> {
    let open_slots = hours.offerable_slots(date, now);
    if !open_slots.contains(&time) {
        return Err(Rejection::SlotUnavailable {
            time,
            hours: hours.hours_label(),
            open_slots,
        });
    }
    Ok(())
}

/// Date checks used when a date is given on its own (format, future, weekday).
pub fn check_date_input(
    hours: &WorkingHours,
    input: &str,
    now: NaiveDateTime,
) -> Result<NaiveDate, Rejection> {
    let date = parse_date(input)?;
    check_future(hours, date, now)?;
    check_day(hours, date)?;
    Ok(date)
}

/// Looks for collisions with the client's (and, depending on scope, the
/// consultancy's) active appointments.
#[allow(clippy::too_many_arguments)]
pub fn check_conflicts(
    conn: &Connection,
    client_id: &str,
    consultancy: &Consultancy,
    hours: &WorkingHours,
    date: NaiveDate,
    time: SlotTime,
    now: NaiveDateTime,
    scope: ConflictScope,
) -> anyhow::Result<Result<(), Rejection>> {
    let mut conflicts = Vec::new();
    if let Some(hit) = conflict::find_conflict(conn, Occupant::Client(client_id), date, time)? {
        conflicts.push(hit);
    }
    if scope.includes_consultancy() {
        if let Some(hit) =
            conflict::find_conflict(conn, Occupant::Consultancy(&consultancy.id), date, time)?
        {
            conflicts.push(hit);
        }
    }

    if conflicts.is_empty() {
        return Ok(Ok(()));
    }

    let taken = taken_slots(conn, client_id, &consultancy.id, date, scope)?;
    Ok(Err(Rejection::Conflict {
        conflicts,
        free_slots: free_slots(hours, date, now, &taken),
    }))
}

/// Slots on `date` that are occupied for this client, plus the consultancy's
/// when the scope includes it.
pub fn taken_slots(
    conn: &Connection,
    client_id: &str,
    consultancy_id: &str,
    date: NaiveDate,
    scope: ConflictScope,
) -> anyhow::Result<Vec<SlotTime>> {
    let mut taken = conflict::booked_times(conn, Occupant::Client(client_id), date)?;
    if scope.includes_consultancy() {
        taken.extend(conflict::booked_times(conn, Occupant::Consultancy(consultancy_id), date)?);
    }
    taken.sort();
    taken.dedup();
    Ok(taken)
}

/// Offerable slots from opening time onward, skipping any that are taken.
pub fn free_slots(
    hours: &WorkingHours,
    date: NaiveDate,
    now: NaiveDateTime,
    taken: &[SlotTime],
) -> Vec<SlotTime> {
    hours
        .offerable_slots(date, now)
        .into_iter()
        .filter(|s| !taken.contains(s))
        .collect()
}

// ── Composed validator ──

/// Runs every check in order and stops at the first failure:
/// existence/verification, format, future date, weekday, slot, conflicts.
pub fn validate_slot(
    conn: &Connection,
    request: &SlotRequest<'_>,
    now: NaiveDateTime,
    scope: ConflictScope,
) -> anyhow::Result<Result<AcceptedSlot, Rejection>> {
    let consultancy = queries::get_consultancy(conn, request.consultancy_id)?;
    let checked = check_bookable(consultancy).and_then(|consultancy| {
        let date = parse_date(request.date)?;
        let time = parse_time(request.time)?;
        let hours = working_hours(&consultancy)?;
        check_future(&hours, date, now)?;
        check_day(&hours, date)?;
        check_slot(&hours, date, time, now)?;
        Ok((consultancy, hours, date, time))
    });

    let (consultancy, hours, date, time) = match checked {
        Ok(parts) => parts,
        Err(rejection) => return Ok(Err(rejection)),
    };

    if let Err(rejection) = check_conflicts(
        conn,
        request.client_id,
        &consultancy,
        &hours,
        date,
        time,
        now,
        scope,
    )? {
        return Ok(Err(rejection));
    }

    Ok(Ok(AcceptedSlot {
        consultancy,
        date,
        time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{
        Appointment, AppointmentStatus, AppointmentType, ConsultancyAvailability,
        VerificationStatus,
    };
    use chrono::Utc;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn add_consultancy(
        conn: &Connection,
        id: &str,
        status: VerificationStatus,
        days: &[&str],
        hours: &str,
    ) {
        let now = Utc::now().naive_utc();
        let consultancy = Consultancy {
            id: id.to_string(),
            name: format!("Consultancy {id}"),
            owner_id: format!("owner-{id}"),
            status,
            availability: ConsultancyAvailability {
                days: days.iter().map(|d| d.to_string()).collect(),
                hours: hours.to_string(),
            },
            fee_cents: 5000,
            created_at: now,
            updated_at: now,
        };
        queries::upsert_consultancy(conn, &consultancy).unwrap();
    }

    /// "c1", open Mondays 9 AM to 6 PM.
    fn add_monday(conn: &Connection, status: VerificationStatus) {
        add_consultancy(conn, "c1", status, &["Monday"], "9:00 AM - 6:00 PM");
    }

    fn add_appointment(
        conn: &Connection,
        id: &str,
        consultancy: &str,
        client: &str,
        day: &str,
        time: &str,
    ) {
        let now = Utc::now().naive_utc();
        let appointment = Appointment {
            id: id.to_string(),
            consultancy_id: consultancy.to_string(),
            consultancy_name: format!("Consultancy {consultancy}"),
            client_id: client.to_string(),
            client_name: "Client".to_string(),
            client_email: "client@example.com".to_string(),
            client_phone: "5551234567".to_string(),
            appointment_date: dt(&format!("{day} 00:00")),
            appointment_time: time.to_string(),
            appointment_type: AppointmentType::Online,
            status: AppointmentStatus::Confirmed,
            payment_method: None,
            meeting_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_appointment(conn, &appointment).unwrap();
    }

    // 2024-06-10 is a Monday, "now" is the Friday before.
    const NOW: &str = "2024-06-07 12:00";

    fn check_with(
        conn: &Connection,
        client: &str,
        date: &str,
        time: &str,
        now: NaiveDateTime,
        scope: ConflictScope,
    ) -> Result<AcceptedSlot, Rejection> {
        let request = SlotRequest {
            consultancy_id: "c1",
            client_id: client,
            date,
            time,
        };
        validate_slot(conn, &request, now, scope).unwrap()
    }

    fn check(
        conn: &Connection,
        client: &str,
        date: &str,
        time: &str,
    ) -> Result<AcceptedSlot, Rejection> {
        check_with(conn, client, date, time, dt(NOW), ConflictScope::Client)
    }

    fn outcome(result: Result<AcceptedSlot, Rejection>) -> ValidationOutcome {
        ValidationOutcome::rejected(result.unwrap_err())
    }

    #[test]
    fn test_valid_booking() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);

        let accepted = check(&conn, "x", "2024-06-10", "10:00 AM").unwrap();
        assert_eq!(accepted.consultancy.id, "c1");
        assert_eq!(accepted.time, SlotTime::from_hour(10).unwrap());
    }

    #[test]
    fn test_unknown_consultancy() {
        let conn = setup_db();
        let rejection = check(&conn, "x", "2024-06-10", "10:00 AM").unwrap_err();
        assert_eq!(rejection, Rejection::ConsultancyNotFound);
    }

    #[test]
    fn test_unverified_consultancy_gets_distinct_message() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Pending);

        let outcome = outcome(check(&conn, "x", "2024-06-10", "10:00 AM"));
        assert!(matches!(outcome.rejection, Some(Rejection::UnderVerification { .. })));
        assert!(outcome.reason().contains("under verification"));
    }

    #[test]
    fn test_format_errors_come_before_temporal_checks() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);

        let rejection = check(&conn, "x", "10/06/2024", "10:00 AM").unwrap_err();
        assert!(matches!(rejection, Rejection::InvalidDate { .. }));

        // Past date with a half-hour time still reports the format problem.
        let outcome = outcome(check(&conn, "x", "2024-01-01", "10:30 AM"));
        assert!(matches!(outcome.rejection, Some(Rejection::InvalidTime { .. })));
        assert!(outcome.reason().contains("on-the-hour"));
    }

    #[test]
    fn test_lowercase_time_is_accepted() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);

        assert!(check(&conn, "x", "2024-06-10", "10:00am").is_ok());
    }

    #[test]
    fn test_same_day_always_rejected() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);

        // Monday 08:00, every slot today is still ahead but same-day is never allowed.
        let monday_morning = dt("2024-06-10 08:00");
        for time in ["9:00 AM", "5:00 PM"] {
            let rejection =
                check_with(&conn, "x", "2024-06-10", time, monday_morning, ConflictScope::Client)
                    .unwrap_err();
            assert!(matches!(rejection, Rejection::DateNotInFuture { .. }));
        }
    }

    #[test]
    fn test_wrong_weekday_lists_available_days() {
        let conn = setup_db();
        let days = ["Monday", "Wednesday"];
        add_consultancy(&conn, "c1", VerificationStatus::Verified, &days, "9:00 AM - 5:00 PM");

        // 2024-06-11 is a Tuesday
        let outcome = outcome(check(&conn, "x", "2024-06-11", "9:00 AM"));
        assert!(matches!(outcome.rejection, Some(Rejection::DayUnavailable { .. })));
        assert!(outcome.suggestions.contains(&"Monday".to_string()));
        assert!(outcome.suggestions.contains(&"Wednesday".to_string()));
        assert!(outcome
            .suggestions
            .contains(&"Next available date: 2024-06-12".to_string()));
    }

    #[test]
    fn test_time_outside_hours_rejected() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);

        let outcome = outcome(check(&conn, "x", "2024-06-10", "6:00 PM"));
        assert!(matches!(outcome.rejection, Some(Rejection::SlotUnavailable { .. })));
        assert_eq!(outcome.available_slots.len(), 9);
        assert_eq!(outcome.suggestions, vec!["9:00 AM", "10:00 AM", "11:00 AM"]);
    }

    #[test]
    fn test_client_conflict_with_alternatives() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);
        add_appointment(&conn, "a1", "c1", "x", "2024-06-10", "10:00 AM");
        add_appointment(&conn, "a2", "c2", "x", "2024-06-10", "9:00 AM");

        let outcome = outcome(check(&conn, "x", "2024-06-10", "10:00 AM"));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(outcome.conflicts[0].contains("2024-06-10 at 10:00 AM"));
        assert_eq!(outcome.suggestions, vec!["11:00 AM", "12:00 PM", "1:00 PM"]);

        assert!(check(&conn, "x", "2024-06-10", "11:00 AM").is_ok());
    }

    #[test]
    fn test_consultancy_scope() {
        let conn = setup_db();
        add_monday(&conn, VerificationStatus::Verified);
        add_appointment(&conn, "a1", "c1", "x", "2024-06-10", "10:00 AM");

        assert!(check(&conn, "y", "2024-06-10", "10:00 AM").is_ok());

        let scope = ConflictScope::ClientAndConsultancy;
        let outcome = outcome(check_with(&conn, "y", "2024-06-10", "10:00 AM", dt(NOW), scope));
        assert!(!outcome.is_valid);
        assert!(outcome.conflicts[0].contains("already booked"));
        assert!(!outcome.suggestions.contains(&"10:00 AM".to_string()));
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = ValidationOutcome::rejected(Rejection::SlotUnavailable {
            time: SlotTime::from_hour(20).unwrap(),
            hours: "9:00 AM - 6:00 PM".to_string(),
            open_slots: vec![SlotTime::from_hour(9).unwrap()],
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["availableSlots"][0], "9:00 AM");
        assert!(json.get("rejection").is_none());
        assert!(json.get("conflicts").is_none());
    }
}

use chrono::{NaiveDateTime, NaiveTime, Utc};
use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use serde::Deserialize;

use crate::config::ConflictScope;
use crate::db::queries;
use crate::models::{Appointment, AppointmentStatus, AppointmentType, PaymentMethod};
use crate::services::scheduling::{self, Rejection, SlotRequest, ValidationOutcome};

/// Everything needed to reserve a slot. Date and time are raw user input.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub consultancy_id: String,
    pub client_id: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub date: String,
    pub time: String,
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BookingRequest {
    fn slot(&self) -> SlotRequest<'_> {
        SlotRequest {
            consultancy_id: &self.consultancy_id,
            client_id: &self.client_id,
            date: &self.date,
            time: &self.time,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BookingOutcome {
    Booked {
        appointment: Appointment,
        amount_cents: i64,
    },
    Rejected(ValidationOutcome),
}

/// Reserve-or-fail. Validation and insert run inside one IMMEDIATE
/// transaction, so concurrent writers for the same slot serialize and the
/// second one sees the first one's row. The partial unique index on
/// (client, date, time) catches anything that slips past.
pub fn book(
    conn: &mut Connection,
    request: &BookingRequest,
    now: NaiveDateTime,
    scope: ConflictScope,
    initial_status: AppointmentStatus,
) -> anyhow::Result<BookingOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let accepted = match scheduling::validate_slot(&tx, &request.slot(), now, scope)? {
        Ok(accepted) => accepted,
        Err(rejection) => {
            tracing::info!(
                consultancy_id = %request.consultancy_id,
                client_id = %request.client_id,
                reason = %rejection,
                "booking rejected"
            );
            return Ok(BookingOutcome::Rejected(ValidationOutcome::rejected(rejection)));
        }
    };

    let created_at = Utc::now().naive_utc();
    let appointment = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        consultancy_id: accepted.consultancy.id.clone(),
        consultancy_name: accepted.consultancy.name.clone(),
        client_id: request.client_id.clone(),
        client_name: request.client_name.trim().to_string(),
        client_email: request.client_email.trim().to_string(),
        client_phone: request.client_phone.trim().to_string(),
        appointment_date: accepted.date.and_time(NaiveTime::MIN),
        appointment_time: accepted.time.label(),
        appointment_type: request.appointment_type,
        status: initial_status,
        payment_method: request.payment_method,
        meeting_id: None,
        notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        created_at,
        updated_at: created_at,
    };

    if let Err(e) = queries::insert_appointment(&tx, &appointment) {
        if !is_unique_violation(&e) {
            return Err(e);
        }
        tracing::warn!(
            client_id = %request.client_id,
            date = %accepted.date,
            time = %accepted.time,
            "slot claimed concurrently"
        );
        let free_slots = match scheduling::working_hours(&accepted.consultancy) {
            Ok(hours) => {
                let taken = scheduling::taken_slots(
                    &tx,
                    &request.client_id,
                    &accepted.consultancy.id,
                    accepted.date,
                    scope,
                )?;
                scheduling::free_slots(&hours, accepted.date, now, &taken)
            }
            Err(_) => Vec::new(),
        };
        return Ok(BookingOutcome::Rejected(ValidationOutcome::rejected(
            Rejection::Conflict {
                conflicts: vec![format!(
                    "You already have an appointment on {} at {}",
                    accepted.date.format("%Y-%m-%d"),
                    accepted.time
                )],
                free_slots,
            },
        )));
    }

    tx.commit()?;

    tracing::info!(
        appointment_id = %appointment.id,
        consultancy_id = %appointment.consultancy_id,
        client_id = %appointment.client_id,
        date = %accepted.date,
        time = %appointment.appointment_time,
        status = appointment.status.as_str(),
        "appointment booked"
    );

    Ok(BookingOutcome::Booked {
        appointment,
        amount_cents: accepted.consultancy.fee_cents,
    })
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
    )
}

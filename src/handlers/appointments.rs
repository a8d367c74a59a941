use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Local, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::slot::parse_query_date;
use crate::models::{
    Appointment, AppointmentStatus, AppointmentType, Party, SlotTime, TransitionError,
};
use crate::services::booking::{self, BookingOutcome, BookingRequest};
use crate::services::conflict::{self, Occupant};
use crate::services::{lifecycle, scheduling};
use crate::state::AppState;

use super::identity::caller_id;

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn labels(slots: &[SlotTime]) -> Vec<String> {
    slots.iter().map(|s| s.label()).collect()
}

fn sweep(conn: &Connection) -> Result<(), AppError> {
    let expired = lifecycle::sweep_expired(conn, local_now())?;
    if expired > 0 {
        tracing::info!("expired {expired} elapsed appointments");
    }
    Ok(())
}

fn find_appointment(conn: &Connection, id: &str) -> Result<Appointment, AppError> {
    queries::get_appointment(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("appointment {id}")))
}

/// Which side of `appointment` the caller is on. The consultancy owner wins
/// if the caller happens to be both.
fn party_for(
    conn: &Connection,
    appointment: &Appointment,
    caller: &str,
) -> Result<Party, AppError> {
    let owner = queries::get_consultancy(conn, &appointment.consultancy_id)?.map(|c| c.owner_id);
    if owner.as_deref() == Some(caller) {
        Ok(Party::Consultant)
    } else if appointment.client_id == caller {
        Ok(Party::Client)
    } else {
        Err(AppError::Forbidden(
            "You can only access your own appointments.".to_string(),
        ))
    }
}

// GET /api/appointments/check?date=&userId=
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub date: String,
    pub user_id: String,
}

pub async fn check_booked_times(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_query_date(&query.date).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid date \"{}\". Use YYYY-MM-DD or DD/MM/YYYY.",
            query.date
        ))
    })?;

    let booked = {
        let db = state.db()?;
        conflict::booked_times(&db, Occupant::Client(&query.user_id), date)?
    };

    Ok(Json(json!({
        "success": true,
        "bookedTimes": labels(&booked),
    })))
}

// GET /api/appointments/slots?consultancyId=&date=&userId=
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsQuery {
    pub consultancy_id: String,
    pub date: String,
    pub user_id: Option<String>,
}

pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_query_date(&query.date).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid date \"{}\". Use YYYY-MM-DD or DD/MM/YYYY.",
            query.date
        ))
    })?;
    let now = local_now();
    let scope = state.config.conflict_scope;

    let db = state.db()?;
    let consultancy = queries::get_consultancy(&db, &query.consultancy_id)?;
    let consultancy = scheduling::check_bookable(consultancy)
        .map_err(|r| AppError::from(scheduling::ValidationOutcome::rejected(r)))?;
    let hours = scheduling::working_hours(&consultancy)
        .map_err(|r| AppError::from(scheduling::ValidationOutcome::rejected(r)))?;

    let mut taken = if scope.includes_consultancy() {
        conflict::booked_times(&db, Occupant::Consultancy(&consultancy.id), date)?
    } else {
        Vec::new()
    };
    if let Some(user_id) = query.user_id.as_deref() {
        taken.extend(conflict::booked_times(&db, Occupant::Client(user_id), date)?);
    }
    taken.sort();
    taken.dedup();

    // Same-day booking is never allowed, so today offers nothing.
    let free = if date > now.date() {
        scheduling::free_slots(&hours, date, now, &taken)
    } else {
        Vec::new()
    };

    Ok(Json(json!({
        "success": true,
        "consultancyId": consultancy.id,
        "date": date.format("%Y-%m-%d").to_string(),
        "availability": hours.to_human_readable(),
        "availableSlots": labels(&free),
        "bookedSlots": labels(&taken),
    })))
}

// POST /api/appointments, POST /api/appointments/book
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointment {
    pub consultancy_id: String,
    pub date: String,
    pub time: String,
    pub appointment_type: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    success: bool,
    appointment_id: String,
    status: AppointmentStatus,
    appointment: Appointment,
}

fn required(field: &str, value: Option<String>) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateAppointment>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = caller_id(&headers)?;
    let appointment_type = AppointmentType::parse(&body.appointment_type).ok_or_else(|| {
        AppError::BadRequest("appointmentType must be \"online\" or \"offline\"".to_string())
    })?;

    let request = BookingRequest {
        consultancy_id: body.consultancy_id,
        client_id,
        client_name: required("clientName", body.client_name)?,
        client_email: required("clientEmail", body.client_email)?,
        client_phone: required("clientPhone", body.client_phone)?,
        date: body.date,
        time: body.time,
        appointment_type,
        payment_method: None,
        notes: body.notes,
    };

    let outcome = {
        let mut db = state.db()?;
        booking::book(
            &mut db,
            &request,
            local_now(),
            state.config.conflict_scope,
            AppointmentStatus::Pending,
        )?
    };

    match outcome {
        // No payment is taken on this path, so there is no receipt yet.
        BookingOutcome::Booked { appointment, .. } => Ok((
            StatusCode::CREATED,
            Json(CreatedResponse {
                success: true,
                appointment_id: appointment.id.clone(),
                status: appointment.status,
                appointment,
            }),
        )),
        BookingOutcome::Rejected(outcome) => Err(outcome.into()),
    }
}

// GET /api/appointments/:id
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&headers)?;
    let db = state.db()?;
    sweep(&db)?;
    let appointment = find_appointment(&db, &id)?;
    party_for(&db, &appointment, &caller)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

// GET /api/appointments/client/:client_id
pub async fn list_for_client(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&headers)?;
    if caller != client_id {
        return Err(AppError::Forbidden(
            "You can only list your own appointments.".to_string(),
        ));
    }

    let db = state.db()?;
    sweep(&db)?;
    let appointments = queries::list_appointments_for_client(&db, &client_id)?;

    Ok(Json(json!({ "success": true, "appointments": appointments })))
}

// GET /api/appointments/consultancy/:consultancy_id
pub async fn list_for_consultancy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(consultancy_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&headers)?;
    let db = state.db()?;
    let consultancy = queries::get_consultancy(&db, &consultancy_id)?
        .ok_or_else(|| AppError::NotFound(format!("consultancy {consultancy_id}")))?;
    if consultancy.owner_id != caller {
        return Err(AppError::Forbidden(
            "Only the consultancy can list its appointments.".to_string(),
        ));
    }

    sweep(&db)?;
    let appointments = queries::list_appointments_for_consultancy(&db, &consultancy_id)?;

    Ok(Json(json!({ "success": true, "appointments": appointments })))
}

// PATCH|PUT /api/appointments/:id
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointment {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub meeting_id: Option<String>,
}

pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateAppointment>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&headers)?;
    let db = state.db()?;
    sweep(&db)?;
    let mut appointment = find_appointment(&db, &id)?;
    let party = party_for(&db, &appointment, &caller)?;

    if let Some(status) = body.status.as_deref() {
        let to = AppointmentStatus::parse(status)
            .ok_or_else(|| AppError::BadRequest(format!("unknown status \"{status}\"")))?;
        appointment
            .status
            .check_transition(to, party)
            .map_err(|e| match e {
                TransitionError::ConsultantOnly { .. } => AppError::Forbidden(e.to_string()),
                TransitionError::Invalid { .. } => AppError::BadRequest(e.to_string()),
            })?;
        appointment.status = to;
    }

    if let Some(meeting_id) = body.meeting_id {
        if appointment.appointment_type != AppointmentType::Online {
            return Err(AppError::BadRequest(
                "meetingId can only be set on online appointments".to_string(),
            ));
        }
        if party != Party::Consultant {
            return Err(AppError::Forbidden(
                "Only the consultancy can start a meeting.".to_string(),
            ));
        }
        appointment.meeting_id = Some(meeting_id);
    }

    if let Some(notes) = body.notes {
        appointment.notes = Some(notes);
    }

    appointment.updated_at = Utc::now().naive_utc();
    queries::update_appointment(&db, &appointment)?;

    tracing::info!(
        appointment_id = %appointment.id,
        status = appointment.status.as_str(),
        "appointment updated"
    );

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

// DELETE /api/appointments/:id
pub async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&headers)?;
    let db = state.db()?;
    let appointment = find_appointment(&db, &id)?;
    party_for(&db, &appointment, &caller)?;
    queries::delete_appointment(&db, &id)?;

    tracing::info!(appointment_id = %id, "appointment deleted");
    Ok(Json(json!({ "success": true })))
}

// POST /api/appointments/update-status
pub async fn run_status_sweep(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let expired = {
        let db = state.db()?;
        lifecycle::sweep_expired(&db, local_now())?
    };
    tracing::info!("status sweep expired {expired} appointments");

    Ok(Json(json!({ "success": true, "expired": expired })))
}

// GET /api/appointments/:id/receipt
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller_id(&headers)?;
    let db = state.db()?;
    let appointment = find_appointment(&db, &id)?;
    party_for(&db, &appointment, &caller)?;

    let body = queries::get_receipt(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("receipt for appointment {id}")))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

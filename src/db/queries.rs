use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Appointment, AppointmentStatus, AppointmentType, ChatSession, Consultancy,
    ConsultancyAvailability, PaymentMethod, VerificationStatus,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const APPOINTMENT_COLUMNS: &str = "id, consultancy_id, consultancy_name, client_id, client_name, \
     client_email, client_phone, appointment_date, appointment_time, appointment_type, status, \
     payment_method, meeting_id, notes, created_at, updated_at";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Consultancies ──

pub fn upsert_consultancy(conn: &Connection, consultancy: &Consultancy) -> anyhow::Result<()> {
    let days = serde_json::to_string(&consultancy.availability.days)?;
    conn.execute(
        "INSERT INTO consultancies (id, name, owner_id, status, availability_days,
           availability_hours, fee_cents, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           owner_id = excluded.owner_id,
           status = excluded.status,
           availability_days = excluded.availability_days,
           availability_hours = excluded.availability_hours,
           fee_cents = excluded.fee_cents,
           updated_at = excluded.updated_at",
        params![
            consultancy.id,
            consultancy.name,
            consultancy.owner_id,
            consultancy.status.as_str(),
            days,
            consultancy.availability.hours,
            consultancy.fee_cents,
            format_ts(&consultancy.created_at),
            format_ts(&consultancy.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_consultancy(conn: &Connection, id: &str) -> anyhow::Result<Option<Consultancy>> {
    let row = conn
        .query_row(
            "SELECT id, name, owner_id, status, availability_days, availability_hours,
                    fee_cents, created_at, updated_at
             FROM consultancies WHERE id = ?1",
            params![id],
            |row| Ok(parse_consultancy_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn list_consultancies(conn: &Connection) -> anyhow::Result<Vec<Consultancy>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_id, status, availability_days, availability_hours,
                fee_cents, created_at, updated_at
         FROM consultancies ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([], |row| Ok(parse_consultancy_row(row)))?;

    let mut consultancies = vec![];
    for row in rows {
        consultancies.push(row??);
    }
    Ok(consultancies)
}

pub fn set_consultancy_status(
    conn: &Connection,
    id: &str,
    status: VerificationStatus,
) -> anyhow::Result<bool> {
    let now = format_ts(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE consultancies SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

fn parse_consultancy_row(row: &rusqlite::Row) -> anyhow::Result<Consultancy> {
    let status: String = row.get(3)?;
    let days_json: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Consultancy {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        status: VerificationStatus::parse(&status),
        availability: ConsultancyAvailability {
            days: serde_json::from_str(&days_json)?,
            hours: row.get(5)?,
        },
        fee_cents: row.get(6)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

// ── Appointments ──

pub fn insert_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            appointment.id,
            appointment.consultancy_id,
            appointment.consultancy_name,
            appointment.client_id,
            appointment.client_name,
            appointment.client_email,
            appointment.client_phone,
            format_ts(&appointment.appointment_date),
            appointment.appointment_time,
            appointment.appointment_type.as_str(),
            appointment.status.as_str(),
            appointment.payment_method.map(|m| m.as_str()),
            appointment.meeting_id,
            appointment.notes,
            format_ts(&appointment.created_at),
            format_ts(&appointment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let row = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn get_active_appointments_for_client(
    conn: &Connection,
    client_id: &str,
) -> anyhow::Result<Vec<Appointment>> {
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE client_id = ?1 AND status IN ('pending', 'confirmed')"
        ),
        client_id,
    )
}

pub fn get_active_appointments_for_consultancy(
    conn: &Connection,
    consultancy_id: &str,
) -> anyhow::Result<Vec<Appointment>> {
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE consultancy_id = ?1 AND status IN ('pending', 'confirmed')"
        ),
        consultancy_id,
    )
}

pub fn list_appointments_for_client(
    conn: &Connection,
    client_id: &str,
) -> anyhow::Result<Vec<Appointment>> {
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE client_id = ?1 ORDER BY appointment_date ASC, created_at ASC"
        ),
        client_id,
    )
}

pub fn list_appointments_for_consultancy(
    conn: &Connection,
    consultancy_id: &str,
) -> anyhow::Result<Vec<Appointment>> {
    query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE consultancy_id = ?1 ORDER BY appointment_date ASC, created_at ASC"
        ),
        consultancy_id,
    )
}

pub fn get_all_active_appointments(conn: &Connection) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE status IN ('pending', 'confirmed')"
    ))?;
    let rows = stmt.query_map([], |row| Ok(parse_appointment_row(row)))?;
    readable_appointments(rows)
}

fn query_appointments(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], |row| Ok(parse_appointment_row(row)))?;
    readable_appointments(rows)
}

/// Collects parsed rows. A row that cannot be read is logged and left out so
/// one bad record never fails a whole listing or sweep.
fn readable_appointments(
    rows: impl Iterator<Item = rusqlite::Result<anyhow::Result<Appointment>>>,
) -> anyhow::Result<Vec<Appointment>> {
    let mut appointments = vec![];
    for row in rows {
        match row? {
            Ok(appointment) => appointments.push(appointment),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable appointment row"),
        }
    }
    Ok(appointments)
}

/// Writes the user-editable fields: status, notes and meeting id.
pub fn update_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, notes = ?2, meeting_id = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            appointment.status.as_str(),
            appointment.notes,
            appointment.meeting_id,
            format_ts(&appointment.updated_at),
            appointment.id,
        ],
    )?;
    Ok(count > 0)
}

/// Marks an appointment expired if it is still active. Returns whether a row changed.
pub fn expire_appointment(
    conn: &Connection,
    id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = 'expired', updated_at = ?1
         WHERE id = ?2 AND status IN ('pending', 'confirmed')",
        params![format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn delete_appointment(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM appointments WHERE id = ?1", params![id])?;
    conn.execute("DELETE FROM receipts WHERE appointment_id = ?1", params![id])?;
    Ok(count > 0)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let id: String = row.get(0)?;
    let appointment_date: String = row.get(7)?;
    let appointment_type: String = row.get(9)?;
    let status: String = row.get(10)?;
    let payment_method: Option<String> = row.get(11)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    let appointment_date = crate::models::slot::normalize_stored_date(&appointment_date)
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .ok_or_else(|| anyhow::anyhow!("appointment {id}: invalid date {appointment_date:?}"))?;
    let appointment_type = AppointmentType::parse(&appointment_type)
        .ok_or_else(|| anyhow::anyhow!("appointment {id}: invalid type {appointment_type:?}"))?;
    let status = AppointmentStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("appointment {id}: invalid status {status:?}"))?;

    Ok(Appointment {
        id,
        consultancy_id: row.get(1)?,
        consultancy_name: row.get(2)?,
        client_id: row.get(3)?,
        client_name: row.get(4)?,
        client_email: row.get(5)?,
        client_phone: row.get(6)?,
        appointment_date,
        appointment_time: row.get(8)?,
        appointment_type,
        status,
        payment_method: payment_method.as_deref().and_then(PaymentMethod::parse),
        meeting_id: row.get(12)?,
        notes: row.get(13)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

// ── Chat Sessions ──

pub fn get_chat_session(
    conn: &Connection,
    session_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<ChatSession>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM chat_sessions WHERE session_id = ?1 AND expires_at > ?2",
            params![session_id, format_ts(now)],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn save_chat_session(
    conn: &Connection,
    session: &ChatSession,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    let data = serde_json::to_string(session)?;
    conn.execute(
        "INSERT INTO chat_sessions (session_id, user_id, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(session_id) DO UPDATE SET
           user_id = excluded.user_id,
           data = excluded.data,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![
            session.session_id,
            session.user_id,
            data,
            format_ts(&session.last_activity),
            format_ts(expires_at),
        ],
    )?;
    Ok(())
}

pub fn delete_chat_session(conn: &Connection, session_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM chat_sessions WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(())
}

pub fn expire_old_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM chat_sessions WHERE expires_at <= ?1",
        params![format_ts(now)],
    )?;
    Ok(count)
}

// ── Receipts ──

pub fn save_receipt(conn: &Connection, appointment_id: &str, body: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO receipts (appointment_id, body) VALUES (?1, ?2)
         ON CONFLICT(appointment_id) DO UPDATE SET body = excluded.body",
        params![appointment_id, body],
    )?;
    Ok(())
}

pub fn get_receipt(conn: &Connection, appointment_id: &str) -> anyhow::Result<Option<String>> {
    let body = conn
        .query_row(
            "SELECT body FROM receipts WHERE appointment_id = ?1",
            params![appointment_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(body)
}

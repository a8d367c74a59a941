use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use tracing::info;

use crate::db::{self, queries};
use crate::models::slot::parse_clock;
use crate::models::Appointment;
use crate::state::AppState;

const SLOT_MINUTES: i64 = 60;

/// When the booked hour is over. Rows whose stored time cannot be read at all
/// are treated as lasting the whole day.
pub fn slot_end(appointment: &Appointment) -> NaiveDateTime {
    let date = appointment.slot_date();
    parse_clock(&appointment.appointment_time)
        .and_then(|(hour, minute)| date.and_hms_opt(hour, minute, 0))
        .map(|start| start + chrono::Duration::minutes(SLOT_MINUTES))
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN) + chrono::Duration::days(1))
}

pub fn has_elapsed(appointment: &Appointment, now: NaiveDateTime) -> bool {
    appointment.status.is_active() && slot_end(appointment) <= now
}

/// Moves every active appointment whose slot has ended to `expired`.
/// Safe to run repeatedly; already-expired rows are left alone.
pub fn sweep_expired(conn: &Connection, now: NaiveDateTime) -> anyhow::Result<usize> {
    let mut expired = 0;
    for appointment in queries::get_all_active_appointments(conn)? {
        if has_elapsed(&appointment, now)
            && queries::expire_appointment(conn, &appointment.id, &now)?
        {
            tracing::debug!(appointment_id = %appointment.id, "appointment expired");
            expired += 1;
        }
    }
    Ok(expired)
}

/// Background task that periodically expires elapsed appointments and idle
/// chat sessions.
pub async fn run_sweeper(state: Arc<AppState>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let now = Local::now().naive_local();

        let swept = db::lock(&state.db).and_then(|conn| sweep_expired(&conn, now));
        match swept {
            Ok(0) => {}
            Ok(n) => info!("expired {n} elapsed appointments"),
            Err(e) => tracing::error!(error = %e, "appointment sweep failed"),
        }

        match state.sessions.purge_expired().await {
            Ok(0) => {}
            Ok(n) => info!("dropped {n} idle chat sessions"),
            Err(e) => tracing::error!(error = %e, "session purge failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, AppointmentType};
    use chrono::Utc;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn appointment(id: &str, day: &str, time: &str, status: AppointmentStatus) -> Appointment {
        let now = Utc::now().naive_utc();
        Appointment {
            id: id.to_string(),
            consultancy_id: "c1".to_string(),
            consultancy_name: "Acme Advisors".to_string(),
            client_id: format!("client-{id}"),
            client_name: "Client".to_string(),
            client_email: "client@example.com".to_string(),
            client_phone: "5551234567".to_string(),
            appointment_date: dt(&format!("{day} 00:00")),
            appointment_time: time.to_string(),
            appointment_type: AppointmentType::Offline,
            status,
            payment_method: None,
            meeting_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_slot_end() {
        let end = |time: &str| {
            slot_end(&appointment("a", "2024-06-10", time, AppointmentStatus::Pending))
        };
        assert_eq!(end("10:00 AM"), dt("2024-06-10 11:00"));
        assert_eq!(end("11:00 PM"), dt("2024-06-11 00:00"));
        assert_eq!(end("14:00"), dt("2024-06-10 15:00"));
        assert_eq!(end("sometime"), dt("2024-06-11 00:00"));
    }

    #[test]
    fn test_sweep_expires_only_elapsed_active_rows() {
        let conn = db::init_db(":memory:").unwrap();
        for a in [
            appointment("past", "2024-06-10", "10:00 AM", AppointmentStatus::Confirmed),
            appointment("running", "2024-06-10", "2:00 PM", AppointmentStatus::Pending),
            appointment("future", "2024-06-11", "9:00 AM", AppointmentStatus::Pending),
            appointment("cancelled", "2024-06-10", "9:00 AM", AppointmentStatus::Cancelled),
        ] {
            queries::insert_appointment(&conn, &a).unwrap();
        }

        let now = dt("2024-06-10 14:30");
        assert_eq!(sweep_expired(&conn, now).unwrap(), 1);
        assert_eq!(sweep_expired(&conn, now).unwrap(), 0);

        let status = |id: &str| queries::get_appointment(&conn, id).unwrap().unwrap().status;
        assert_eq!(status("past"), AppointmentStatus::Expired);
        assert_eq!(status("running"), AppointmentStatus::Pending);
        assert_eq!(status("future"), AppointmentStatus::Pending);
        assert_eq!(status("cancelled"), AppointmentStatus::Cancelled);

        // The running slot ends at 3 PM exactly.
        assert_eq!(sweep_expired(&conn, dt("2024-06-10 15:00")).unwrap(), 1);
        assert_eq!(status("running"), AppointmentStatus::Expired);
    }

    #[test]
    fn test_sweep_skips_unreadable_rows() {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_appointment(
            &conn,
            &appointment("past", "2024-06-10", "10:00 AM", AppointmentStatus::Confirmed),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO appointments (id, consultancy_id, consultancy_name, client_id, client_name,
                client_email, client_phone, appointment_date, appointment_time, appointment_type,
                status, created_at, updated_at)
             VALUES ('garbled', 'c1', 'Acme Advisors', 'someone-else', 'X', 'x@example.com',
                '5551234567', 'Mon Jun 10 2024', '10:00 AM', 'online', 'confirmed',
                '2024-06-01 00:00:00', '2024-06-01 00:00:00')",
            [],
        )
        .unwrap();

        assert_eq!(sweep_expired(&conn, dt("2024-06-10 14:30")).unwrap(), 1);
        let past = queries::get_appointment(&conn, "past").unwrap().unwrap();
        assert_eq!(past.status, AppointmentStatus::Expired);
        assert_eq!(queries::list_appointments_for_consultancy(&conn, "c1").unwrap().len(), 1);
    }
}

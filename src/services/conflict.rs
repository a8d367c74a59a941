use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Appointment, SlotTime};

/// The identity a slot is checked against.
#[derive(Debug, Clone, Copy)]
pub enum Occupant<'a> {
    Client(&'a str),
    Consultancy(&'a str),
}

fn active_appointments(
    conn: &Connection,
    occupant: Occupant<'_>,
) -> anyhow::Result<Vec<Appointment>> {
    match occupant {
        Occupant::Client(id) => queries::get_active_appointments_for_client(conn, id),
        Occupant::Consultancy(id) => queries::get_active_appointments_for_consultancy(conn, id),
    }
}

/// Returns a description of the first active appointment occupying exactly
/// (`date`, `time`) for `occupant`, if any. Stored times are normalized to
/// 12-hour labels before comparing; a slot either matches exactly or not at all.
pub fn find_conflict(
    conn: &Connection,
    occupant: Occupant<'_>,
    date: NaiveDate,
    time: SlotTime,
) -> anyhow::Result<Option<String>> {
    let hit = active_appointments(conn, occupant)?
        .into_iter()
        .find(|a| a.slot_date() == date && a.slot_time() == Some(time));

    Ok(hit.map(|a| {
        let when = format!("{} at {}", date.format("%Y-%m-%d"), time);
        match occupant {
            Occupant::Client(_) => {
                format!("You already have an appointment with {} on {when}", a.consultancy_name)
            }
            Occupant::Consultancy(_) => {
                format!("{} is already booked on {when}", a.consultancy_name)
            }
        }
    }))
}

/// Occupied slot times for `occupant` on `date`, sorted and deduplicated.
pub fn booked_times(
    conn: &Connection,
    occupant: Occupant<'_>,
    date: NaiveDate,
) -> anyhow::Result<Vec<SlotTime>> {
    let mut times: Vec<SlotTime> = active_appointments(conn, occupant)?
        .iter()
        .filter(|a| a.slot_date() == date)
        .filter_map(|a| {
            let time = a.slot_time();
            if time.is_none() {
                tracing::debug!(
                    appointment_id = %a.id,
                    stored_time = %a.appointment_time,
                    "skipping appointment with non-slot time"
                );
            }
            time
        })
        .collect();
    times.sort();
    times.dedup();
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{AppointmentStatus, AppointmentType};
    use chrono::{NaiveDateTime, Utc};
    use rusqlite::params;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn slot(s: &str) -> SlotTime {
        SlotTime::parse_input(s).unwrap()
    }

    fn insert(
        conn: &Connection,
        id: &str,
        client: &str,
        day: &str,
        time: &str,
        status: AppointmentStatus,
    ) {
        let now = Utc::now().naive_utc();
        let appointment = Appointment {
            id: id.to_string(),
            consultancy_id: "c1".to_string(),
            consultancy_name: "Acme Advisors".to_string(),
            client_id: client.to_string(),
            client_name: "Client".to_string(),
            client_email: "client@example.com".to_string(),
            client_phone: "5551234567".to_string(),
            appointment_date: NaiveDateTime::parse_from_str(
                &format!("{day} 00:00:00"),
                "%Y-%m-%d %H:%M:%S",
            )
            .unwrap(),
            appointment_time: time.to_string(),
            appointment_type: AppointmentType::Online,
            status,
            payment_method: None,
            meeting_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_appointment(conn, &appointment).unwrap();
    }

    fn on_june_10(conn: &Connection, occupant: Occupant<'_>, time: &str) -> Option<String> {
        find_conflict(conn, occupant, date("2024-06-10"), slot(time)).unwrap()
    }

    #[test]
    fn test_exact_match_conflicts() {
        let conn = setup_db();
        insert(&conn, "a1", "x", "2024-06-10", "10:00 AM", AppointmentStatus::Confirmed);

        let hit = on_june_10(&conn, Occupant::Client("x"), "10:00 AM");
        let message = hit.expect("expected a conflict");
        assert!(message.contains("2024-06-10"));
        assert!(message.contains("10:00 AM"));

        let free = on_june_10(&conn, Occupant::Client("x"), "11:00 AM");
        assert!(free.is_none());
    }

    #[test]
    fn test_other_client_does_not_conflict() {
        let conn = setup_db();
        insert(&conn, "a1", "x", "2024-06-10", "10:00 AM", AppointmentStatus::Confirmed);

        let hit = on_june_10(&conn, Occupant::Client("y"), "10:00 AM");
        assert!(hit.is_none());

        let consultancy_hit = on_june_10(&conn, Occupant::Consultancy("c1"), "10:00 AM");
        assert!(consultancy_hit.unwrap().contains("Acme Advisors is already booked"));
    }

    #[test]
    fn test_inactive_appointments_ignored() {
        let conn = setup_db();
        insert(&conn, "a1", "x", "2024-06-10", "10:00 AM", AppointmentStatus::Cancelled);
        insert(&conn, "a2", "x", "2024-06-10", "10:00 AM", AppointmentStatus::Expired);

        let hit = on_june_10(&conn, Occupant::Client("x"), "10:00 AM");
        assert!(hit.is_none());
    }

    #[test]
    fn test_legacy_24_hour_rows_are_normalized() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO appointments (id, consultancy_id, consultancy_name, client_id, client_name,
                client_email, client_phone, appointment_date, appointment_time, appointment_type,
                status, created_at, updated_at)
             VALUES ('legacy', 'c1', 'Acme Advisors', 'x', 'X', 'x@example.com', '5551234567',
                '2024-06-10T00:00:00.000Z', '14:00', 'offline', 'pending',
                '2024-06-01 00:00:00', '2024-06-01 00:00:00')",
            params![],
        )
        .unwrap();

        let hit = on_june_10(&conn, Occupant::Client("x"), "2:00 PM");
        assert!(hit.is_some());

        let booked = booked_times(&conn, Occupant::Client("x"), date("2024-06-10")).unwrap();
        assert_eq!(booked, vec![slot("2:00 PM")]);
    }

    #[test]
    fn test_booked_times_sorted() {
        let conn = setup_db();
        insert(&conn, "a1", "x", "2024-06-10", "3:00 PM", AppointmentStatus::Pending);
        insert(&conn, "a2", "x", "2024-06-10", "9:00 AM", AppointmentStatus::Confirmed);
        insert(&conn, "a3", "x", "2024-06-11", "9:00 AM", AppointmentStatus::Confirmed);

        let booked = booked_times(&conn, Occupant::Client("x"), date("2024-06-10")).unwrap();
        assert_eq!(booked, vec![slot("9:00 AM"), slot("3:00 PM")]);
    }
}

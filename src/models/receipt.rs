use serde::{Deserialize, Serialize};

use super::appointment::Appointment;

/// Payload handed to the receipt renderer after a booking commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub amount_cents: i64,
    pub payment_method: Option<String>,
    pub client_name: String,
    pub consultancy_name: String,
    pub appointment_type: String,
    pub date: String,
    pub time: String,
    pub transaction_date: String,
}

impl Receipt {
    pub fn for_appointment(appointment: &Appointment, amount_cents: i64) -> Self {
        Self {
            id: appointment.id.clone(),
            amount_cents,
            payment_method: appointment.payment_method.map(|m| m.as_str().to_string()),
            client_name: appointment.client_name.clone(),
            consultancy_name: appointment.consultancy_name.clone(),
            appointment_type: appointment.appointment_type.as_str().to_string(),
            date: appointment.slot_date().format("%Y-%m-%d").to_string(),
            time: appointment.appointment_time.clone(),
            transaction_date: appointment.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

use std::fmt::Write;
use std::sync::Arc;

use crate::db::{self, queries};
use crate::models::consultancy::format_fee;
use crate::models::{Appointment, Receipt};
use crate::state::AppState;

/// Turns a receipt into a document. Rendering happens off the booking path.
pub trait ReceiptRenderer: Send + Sync {
    fn render(&self, receipt: &Receipt) -> anyhow::Result<String>;
}

pub struct TextReceiptRenderer;

impl ReceiptRenderer for TextReceiptRenderer {
    fn render(&self, receipt: &Receipt) -> anyhow::Result<String> {
        let mut out = String::new();
        writeln!(out, "PAYMENT RECEIPT")?;
        writeln!(out, "Receipt ID:       {}", receipt.id)?;
        writeln!(out, "Transaction date: {}", receipt.transaction_date)?;
        writeln!(out)?;
        writeln!(out, "Client:           {}", receipt.client_name)?;
        writeln!(out, "Consultancy:      {}", receipt.consultancy_name)?;
        writeln!(
            out,
            "Appointment:      {} at {} ({})",
            receipt.date, receipt.time, receipt.appointment_type
        )?;
        writeln!(out)?;
        writeln!(out, "Amount paid:      {}", format_fee(receipt.amount_cents))?;
        writeln!(
            out,
            "Payment method:   {}",
            receipt.payment_method.as_deref().unwrap_or("n/a")
        )?;
        Ok(out)
    }
}

/// Renders and stores the receipt for a freshly paid appointment in the
/// background. Failures are logged and never reach the booking caller.
/// Returns false, without spawning anything, when nothing was paid.
pub fn dispatch_receipt(
    state: &Arc<AppState>,
    appointment: &Appointment,
    amount_cents: i64,
) -> bool {
    if appointment.payment_method.is_none() {
        tracing::debug!(appointment_id = %appointment.id, "no payment, skipping receipt");
        return false;
    }
    let state = Arc::clone(state);
    let receipt = Receipt::for_appointment(appointment, amount_cents);

    tokio::spawn(async move {
        let stored = state
            .receipts
            .render(&receipt)
            .and_then(|body| {
                let conn = db::lock(&state.db)?;
                queries::save_receipt(&conn, &receipt.id, &body)
            });

        match stored {
            Ok(()) => tracing::info!(appointment_id = %receipt.id, "receipt generated"),
            Err(e) => tracing::error!(
                appointment_id = %receipt.id,
                error = %e,
                "failed to generate receipt"
            ),
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ConflictScope, SessionBackend};
    use crate::models::{AppointmentStatus, AppointmentType, PaymentMethod};
    use chrono::{NaiveDate, Utc};
    use std::time::Duration;

    fn test_state() -> Arc<AppState> {
        let config = AppConfig {
            port: 0,
            database_url: ":memory:".to_string(),
            admin_token: String::new(),
            llm_enabled: false,
            ollama_url: String::new(),
            ollama_model: String::new(),
            session_backend: SessionBackend::Memory,
            session_ttl: Duration::from_secs(60),
            chat_reply_delay: Duration::ZERO,
            sweep_interval: Duration::ZERO,
            conflict_scope: ConflictScope::Client,
        };
        Arc::new(AppState::new(db::init_db(":memory:").unwrap(), config))
    }

    fn appointment(payment_method: Option<PaymentMethod>) -> Appointment {
        let now = Utc::now().naive_utc();
        Appointment {
            id: "appt-1".to_string(),
            consultancy_id: "c1".to_string(),
            consultancy_name: "Acme Advisors".to_string(),
            client_id: "client-1".to_string(),
            client_name: "Jane Doe".to_string(),
            client_email: "jane@example.com".to_string(),
            client_phone: "5551234567".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2024, 6, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            appointment_time: "10:00 AM".to_string(),
            appointment_type: AppointmentType::Online,
            status: AppointmentStatus::Confirmed,
            payment_method,
            meeting_id: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_receipt_only_for_paid_appointments() {
        let state = test_state();
        assert!(!dispatch_receipt(&state, &appointment(None), 4999));

        assert!(dispatch_receipt(&state, &appointment(Some(PaymentMethod::Card)), 4999));
        let mut body = None;
        for _ in 0..50 {
            body = queries::get_receipt(&state.db().unwrap(), "appt-1").unwrap();
            if body.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let body = body.unwrap();
        assert!(body.contains("49.99"));
        assert!(body.contains("card"));
    }

    #[test]
    fn test_text_receipt() {
        let receipt = Receipt {
            id: "appt-1".to_string(),
            amount_cents: 7550,
            payment_method: Some("upi".to_string()),
            client_name: "Jane Doe".to_string(),
            consultancy_name: "Acme Advisors".to_string(),
            appointment_type: "online".to_string(),
            date: "2024-06-10".to_string(),
            time: "10:00 AM".to_string(),
            transaction_date: "2024-06-07 12:00:00".to_string(),
        };

        let body = TextReceiptRenderer.render(&receipt).unwrap();
        assert!(body.contains("appt-1"));
        assert!(body.contains("2024-06-10 at 10:00 AM (online)"));
        assert!(body.contains("75.50"));
        assert!(body.contains("upi"));
    }
}

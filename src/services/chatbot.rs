use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::models::consultancy::format_fee;
use crate::models::{
    AppointmentStatus, AppointmentType, BookingStep, ChatMessage, ChatSession, Consultancy,
    ConsultancyRef, ContactDetails, PaymentMethod, SlotTime, WorkingHours,
};
use crate::services::ai::assistant;
use crate::services::booking::{self, BookingOutcome, BookingRequest};
use crate::services::receipts;
use crate::services::scheduling::{self, Rejection, ValidationOutcome};
use crate::state::AppState;

/// Whole-message commands that abandon a booking in progress.
const CANCEL_WORDS: &[&str] = &[
    "cancel",
    "stop",
    "quit",
    "exit",
    "abort",
    "nevermind",
    "never mind",
];
const BOOKING_WORDS: &[&str] = &[
    "book",
    "booking",
    "appointment",
    "schedule",
    "consult",
    "consultation",
];

const CONTACT_PROMPT: &str = "Please send your name, email and phone number separated by commas, \
     for example: Jane Doe, jane@example.com, +1 555 123 4567";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub appointment_id: String,
    pub consultancy_name: String,
    pub date: String,
    pub time: String,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub payment_method: PaymentMethod,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub success: bool,
    pub reply: String,
    pub session_id: String,
    pub chat_history: Vec<ChatMessage>,
    pub step: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
}

/// Result of handling one message in a given step.
struct Transition {
    step: BookingStep,
    reply: String,
    booking: Option<BookingSummary>,
    validation: Option<ValidationOutcome>,
}

impl Transition {
    fn to(step: BookingStep, reply: impl Into<String>) -> Self {
        Self {
            step,
            reply: reply.into(),
            booking: None,
            validation: None,
        }
    }

    fn idle(reply: impl Into<String>) -> Self {
        Self::to(BookingStep::Idle, reply)
    }
}

pub async fn process_message(
    state: &Arc<AppState>,
    turn: ChatTurn,
    now: NaiveDateTime,
) -> anyhow::Result<ChatReply> {
    let session_id = turn
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let user_id = turn.user_id.filter(|u| !u.trim().is_empty());

    let mut session = state
        .sessions
        .get(&session_id)
        .await?
        .unwrap_or_else(|| ChatSession::new(session_id.clone(), user_id.clone()));
    if session.user_id.is_none() {
        session.user_id = user_id;
    }

    let message = turn.message.trim().to_string();
    session.push("user", &message);

    let step = std::mem::take(&mut session.step);
    let from = step.index();
    let consultancy_id = step.consultancy().map(|c| c.id.clone());

    let transition = if is_cancel(&message) {
        if step == BookingStep::Idle {
            Transition::idle(
                "There is no booking in progress. \
                 Type the name of a consultancy whenever you want to start one.",
            )
        } else {
            Transition::idle(
                "Booking cancelled. Nothing was saved. \
                 Type the name of a consultancy to start again.",
            )
        }
    } else {
        advance(state, &session, step, &message, now).await?
    };

    tracing::info!(
        session_id = %session.session_id,
        consultancy_id = consultancy_id.as_deref().unwrap_or("-"),
        from_step = from,
        to_step = transition.step.index(),
        "chat turn processed"
    );

    session.step = transition.step;
    session.push("assistant", &transition.reply);
    session.last_activity = Utc::now().naive_utc();
    state.sessions.set(&session).await?;

    Ok(ChatReply {
        success: true,
        reply: transition.reply,
        session_id: session.session_id.clone(),
        chat_history: session.history.clone(),
        step: session.step.index(),
        booking: transition.booking,
        validation: transition.validation,
    })
}

/// True only when the message as a whole is a cancel command, so names and
/// contact details that merely contain "stop" or "exit" pass through.
fn is_cancel(message: &str) -> bool {
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    CANCEL_WORDS.contains(&words.join(" ").as_str())
}

fn mentions_booking(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| BOOKING_WORDS.contains(&word))
}

async fn advance(
    state: &Arc<AppState>,
    session: &ChatSession,
    step: BookingStep,
    message: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Transition> {
    let transition = match step {
        BookingStep::Idle => return idle(state, session, message, now).await,

        BookingStep::AwaitingDate { consultancy } => {
            let conn = db::lock(&state.db)?;
            let hours = match load_bookable(&conn, &consultancy.id)? {
                Ok((_, hours)) => hours,
                Err(rejection) => return Ok(restart(rejection)),
            };
            match scheduling::check_date_input(&hours, message, now) {
                Err(rejection) => retry(BookingStep::AwaitingDate { consultancy }, rejection),
                Ok(date) => {
                    let taken = scheduling::taken_slots(
                        &conn,
                        &session.client_id(),
                        &consultancy.id,
                        date,
                        state.config.conflict_scope,
                    )?;
                    let free = scheduling::free_slots(&hours, date, now, &taken);
                    if free.is_empty() {
                        Transition::to(
                            BookingStep::AwaitingDate { consultancy },
                            format!(
                                "There are no free slots left on {}. \
                                 Please choose another date (YYYY-MM-DD).",
                                date.format("%Y-%m-%d")
                            ),
                        )
                    } else {
                        Transition::to(
                            BookingStep::AwaitingTime { consultancy, date },
                            format!(
                                "Available times on {}: {}. Which time would you like?",
                                date.format("%Y-%m-%d"),
                                join_slots(&free)
                            ),
                        )
                    }
                }
            }
        }

        BookingStep::AwaitingTime { consultancy, date } => {
            let time = match scheduling::parse_time(message) {
                Ok(time) => time,
                Err(rejection) => {
                    return Ok(retry(
                        BookingStep::AwaitingTime { consultancy, date },
                        rejection,
                    ))
                }
            };
            let conn = db::lock(&state.db)?;
            let (current, hours) = match load_bookable(&conn, &consultancy.id)? {
                Ok(found) => found,
                Err(rejection) => return Ok(restart(rejection)),
            };
            let checked = match scheduling::check_slot(&hours, date, time, now) {
                Ok(()) => scheduling::check_conflicts(
                    &conn,
                    &session.client_id(),
                    &current,
                    &hours,
                    date,
                    time,
                    now,
                    state.config.conflict_scope,
                )?,
                Err(rejection) => Err(rejection),
            };
            match checked {
                Err(rejection) => {
                    retry(BookingStep::AwaitingTime { consultancy, date }, rejection)
                }
                Ok(()) => Transition::to(
                    BookingStep::AwaitingMode {
                        consultancy,
                        date,
                        time,
                    },
                    format!(
                        "{time} on {} it is. Would you like to meet online or offline?",
                        date.format("%Y-%m-%d")
                    ),
                ),
            }
        }

        BookingStep::AwaitingMode {
            consultancy,
            date,
            time,
        } => match AppointmentType::detect(message) {
            Some(mode) => Transition::to(
                BookingStep::AwaitingContact {
                    consultancy,
                    date,
                    time,
                    mode,
                },
                format!("Got it, an {} meeting. {CONTACT_PROMPT}", mode.as_str()),
            ),
            None => Transition::to(
                BookingStep::AwaitingMode {
                    consultancy,
                    date,
                    time,
                },
                "Please reply with either \"online\" or \"offline\".",
            ),
        },

        BookingStep::AwaitingContact {
            consultancy,
            date,
            time,
            mode,
        } => match ContactDetails::parse(message) {
            Ok(contact) => {
                let fee = {
                    let conn = db::lock(&state.db)?;
                    queries::get_consultancy(&conn, &consultancy.id)?.map(|c| c.fee_cents)
                };
                let methods = PaymentMethod::ALL.map(|m| m.as_str()).join(", ");
                let reply = match fee {
                    Some(fee) => format!(
                        "Thanks {}. The session fee is {}. \
                         How would you like to pay? Options: {methods}.",
                        contact.name,
                        format_fee(fee)
                    ),
                    None => format!(
                        "Thanks {}. How would you like to pay? Options: {methods}.",
                        contact.name
                    ),
                };
                Transition::to(
                    BookingStep::AwaitingPayment {
                        consultancy,
                        date,
                        time,
                        mode,
                        contact,
                    },
                    reply,
                )
            }
            Err(e) => Transition::to(
                BookingStep::AwaitingContact {
                    consultancy,
                    date,
                    time,
                    mode,
                },
                format!("Sorry, {e}. {CONTACT_PROMPT}"),
            ),
        },

        BookingStep::AwaitingPayment {
            consultancy,
            date,
            time,
            mode,
            contact,
        } => match PaymentMethod::parse(message) {
            Some(method) => {
                let slot = ChosenSlot {
                    consultancy,
                    date,
                    time,
                    mode,
                };
                return complete(state, session, slot, contact, method, now);
            }
            None => Transition::to(
                BookingStep::AwaitingPayment {
                    consultancy,
                    date,
                    time,
                    mode,
                    contact,
                },
                format!(
                    "Please choose one of: {}.",
                    PaymentMethod::ALL.map(|m| m.as_str()).join(", ")
                ),
            ),
        },
    };
    Ok(transition)
}

async fn idle(
    state: &Arc<AppState>,
    session: &ChatSession,
    message: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Transition> {
    let (named, verified) = {
        let conn = db::lock(&state.db)?;
        let all = queries::list_consultancies(&conn)?;
        let named = find_named(&all, message).cloned();
        let verified: Vec<Consultancy> = all.into_iter().filter(|c| c.is_verified()).collect();
        (named, verified)
    };

    if let Some(consultancy) = named {
        let checked = scheduling::check_bookable(Some(consultancy))
            .and_then(|c| scheduling::working_hours(&c).map(|h| (c, h)));
        return Ok(match checked {
            Err(rejection) => restart(rejection),
            Ok((consultancy, hours)) => {
                let example = hours
                    .next_working_date(now.date())
                    .map(|d| format!(", for example {}", d.format("%Y-%m-%d")))
                    .unwrap_or_default();
                let reply = format!(
                    "Let's book with {}. They are available {}. \
                     Which date would you like? Please use YYYY-MM-DD{example}.",
                    consultancy.name,
                    hours.to_human_readable()
                );
                Transition::to(
                    BookingStep::AwaitingDate {
                        consultancy: ConsultancyRef {
                            id: consultancy.id,
                            name: consultancy.name,
                        },
                    },
                    reply,
                )
            }
        });
    }

    if mentions_booking(message) {
        if verified.is_empty() {
            return Ok(Transition::idle(
                "No consultancies are taking bookings right now. Please check back later.",
            ));
        }
        let listing = verified
            .iter()
            .map(|c| {
                let hours = c
                    .availability
                    .parse()
                    .map(|h| h.to_human_readable())
                    .unwrap_or_default();
                format!("- {} ({hours})", c.name)
            })
            .collect::<Vec<_>>()
            .join("\n");
        return Ok(Transition::idle(format!(
            "These consultancies are taking bookings:\n{listing}\nType the name of one to start."
        )));
    }

    let reply =
        assistant::general_reply(state.llm.as_deref(), &session.history, &verified).await;
    Ok(Transition::idle(reply))
}

/// The longest consultancy name contained in the message, case-insensitively.
fn find_named<'a>(consultancies: &'a [Consultancy], message: &str) -> Option<&'a Consultancy> {
    let lower = message.to_lowercase();
    consultancies
        .iter()
        .filter(|c| {
            let name = c.name.trim();
            !name.is_empty() && lower.contains(&name.to_lowercase())
        })
        .max_by_key(|c| c.name.trim().len())
}

fn load_bookable(
    conn: &Connection,
    consultancy_id: &str,
) -> anyhow::Result<Result<(Consultancy, WorkingHours), Rejection>> {
    let consultancy = queries::get_consultancy(conn, consultancy_id)?;
    Ok(scheduling::check_bookable(consultancy)
        .and_then(|c| scheduling::working_hours(&c).map(|h| (c, h))))
}

fn join_slots(slots: &[SlotTime]) -> String {
    slots.iter().map(|s| s.label()).collect::<Vec<_>>().join(", ")
}

fn with_suggestions(outcome: &ValidationOutcome) -> String {
    if outcome.suggestions.is_empty() {
        outcome.reason()
    } else {
        format!(
            "{} Suggestions: {}.",
            outcome.reason(),
            outcome.suggestions.join(", ")
        )
    }
}

/// Re-prompts the same step with the violated rule.
fn retry(step: BookingStep, rejection: Rejection) -> Transition {
    let outcome = ValidationOutcome::rejected(rejection);
    Transition {
        step,
        reply: with_suggestions(&outcome),
        booking: None,
        validation: Some(outcome),
    }
}

/// Dead end: the consultancy can no longer be booked, so the flow starts over.
fn restart(rejection: Rejection) -> Transition {
    let outcome = ValidationOutcome::rejected(rejection);
    Transition {
        step: BookingStep::Idle,
        reply: outcome.reason(),
        booking: None,
        validation: Some(outcome),
    }
}

/// The slot settled on in steps 1 to 3.
struct ChosenSlot {
    consultancy: ConsultancyRef,
    date: NaiveDate,
    time: SlotTime,
    mode: AppointmentType,
}

fn complete(
    state: &Arc<AppState>,
    session: &ChatSession,
    slot: ChosenSlot,
    contact: ContactDetails,
    method: PaymentMethod,
    now: NaiveDateTime,
) -> anyhow::Result<Transition> {
    let ChosenSlot {
        consultancy,
        date,
        time,
        mode,
    } = slot;
    let request = BookingRequest {
        consultancy_id: consultancy.id,
        client_id: session.client_id(),
        client_name: contact.name,
        client_email: contact.email,
        client_phone: contact.phone,
        date: date.format("%Y-%m-%d").to_string(),
        time: time.label(),
        appointment_type: mode,
        payment_method: Some(method),
        notes: None,
    };

    // Payment is simulated, so chat bookings are confirmed straight away.
    let outcome = {
        let mut conn = db::lock(&state.db)?;
        booking::book(
            &mut conn,
            &request,
            now,
            state.config.conflict_scope,
            AppointmentStatus::Confirmed,
        )?
    };

    Ok(match outcome {
        BookingOutcome::Booked { appointment, amount_cents } => {
            receipts::dispatch_receipt(state, &appointment, amount_cents);
            let reply = format!(
                "Payment received via {}. Your {} appointment with {} on {} at {} is confirmed. \
                 Booking reference: {}.",
                method.as_str(),
                appointment.appointment_type.as_str(),
                appointment.consultancy_name,
                request.date,
                appointment.appointment_time,
                appointment.id
            );
            Transition {
                step: BookingStep::Idle,
                reply,
                booking: Some(BookingSummary {
                    appointment_id: appointment.id,
                    consultancy_name: appointment.consultancy_name,
                    date: request.date,
                    time: appointment.appointment_time,
                    appointment_type: appointment.appointment_type,
                    status: appointment.status,
                    payment_method: method,
                    amount: format_fee(amount_cents),
                }),
                validation: None,
            }
        }
        BookingOutcome::Rejected(outcome) => Transition {
            step: BookingStep::Idle,
            reply: format!(
                "Sorry, the booking could not be completed. {} No payment was taken. \
                 Type the name of a consultancy to start again.",
                with_suggestions(&outcome)
            ),
            booking: None,
            validation: Some(outcome),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_keywords() {
        assert!(is_cancel("cancel"));
        assert!(is_cancel("  STOP! "));
        assert!(is_cancel("Never mind."));
        assert!(is_cancel("nevermind"));
        assert!(!is_cancel("2024-06-10"));
        assert!(!is_cancel("stopwatch consulting"));
        assert!(!is_cancel("Exit Strategy Partners"));
        assert!(!is_cancel("Stop Jones, stop@example.com, 5551234567"));
    }

    #[test]
    fn test_booking_keywords() {
        assert!(mentions_booking("I want to book an appointment"));
        assert!(!mentions_booking("what are your prices?"));
    }

    #[test]
    fn test_find_named_prefers_longest() {
        let now = Utc::now().naive_utc();
        let make = |id: &str, name: &str| Consultancy {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: "o".to_string(),
            status: crate::models::VerificationStatus::Verified,
            availability: Default::default(),
            fee_cents: 0,
            created_at: now,
            updated_at: now,
        };
        let all = vec![make("1", "Acme"), make("2", "Acme Legal")];
        assert_eq!(find_named(&all, "book with acme legal please").unwrap().id, "2");
        assert_eq!(find_named(&all, "ACME").unwrap().id, "1");
        assert!(find_named(&all, "someone else").is_none());
    }
}

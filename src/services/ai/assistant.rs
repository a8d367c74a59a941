use crate::models::consultancy::format_fee;
use crate::models::{ChatMessage, Consultancy};

use super::LlmProvider;

const SYSTEM_PROMPT: &str = r#"You are the booking assistant of a consultancy marketplace.
Answer the user's question briefly and politely.

Rules:
- You cannot book, change or cancel appointments yourself.
- To book, the user types the name of a consultancy from the list below and follows the prompts.
- Never invent consultancies, prices, dates or free slots.
- Keep replies under 80 words.
"#;

pub const FALLBACK_REPLY: &str = "I can help you book a consultation. Type \"book\" to see the \
    consultancies that are taking appointments, or type the name of a consultancy to start \
    booking with it.";

fn directory(consultancies: &[Consultancy]) -> String {
    consultancies
        .iter()
        .map(|c| {
            let hours = c
                .availability
                .parse()
                .map(|h| h.to_human_readable())
                .unwrap_or_else(|_| "hours not published".to_string());
            format!("- {} ({hours}; fee {})", c.name, format_fee(c.fee_cents))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Free-form reply for messages outside a booking flow. Falls back to a fixed
/// help text when no model is configured or the model call fails.
pub async fn general_reply(
    llm: Option<&dyn LlmProvider>,
    history: &[ChatMessage],
    consultancies: &[Consultancy],
) -> String {
    let Some(llm) = llm else {
        return FALLBACK_REPLY.to_string();
    };

    let system = format!(
        "{SYSTEM_PROMPT}\nConsultancies accepting bookings:\n{}",
        directory(consultancies)
    );

    match llm.chat(&system, history).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "LLM reply failed, using fallback");
            FALLBACK_REPLY.to_string()
        }
    }
}

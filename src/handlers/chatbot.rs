use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Local;

use crate::errors::AppError;
use crate::services::chatbot::{self, ChatReply, ChatTurn};
use crate::state::AppState;

// POST /api/chatbot
pub async fn chat_turn(
    State(state): State<Arc<AppState>>,
    Json(turn): Json<ChatTurn>,
) -> Result<Json<ChatReply>, AppError> {
    if turn.message.trim().is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }

    let reply = chatbot::process_message(&state, turn, Local::now().naive_local()).await?;

    // Pacing only, so replies don't feel instantaneous.
    if !state.config.chat_reply_delay.is_zero() {
        tokio::time::sleep(state.config.chat_reply_delay).await;
    }

    Ok(Json(reply))
}

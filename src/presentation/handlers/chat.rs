use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};

use crate::application::services::TurnRequest;
use crate::domain::{ConversationId, ThreadId};
use crate::presentation::state::AppState;

use super::ApiError;

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub conversation_id: ConversationId,
    pub thread_id: ThreadId,
    pub response: String,
}

#[tracing::instrument(skip(state, payload))]
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    let outcome = state
        .chat_turn_service
        .submit_turn(TurnRequest {
            user_id: request.user_id,
            conversation_id: request.conversation_id.map(ConversationId::from_i64),
            message: request.message,
        })
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        conversation_id: outcome.conversation_id,
        thread_id: outcome.thread_id,
        response: outcome.response,
    }))
}

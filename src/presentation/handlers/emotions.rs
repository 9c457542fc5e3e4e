use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};

use crate::application::services::ClassificationRequest;
use crate::domain::{AnalysisId, ConversationId, EmotionClassification, MessageId};
use crate::presentation::state::AppState;

use super::ApiError;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub message_id: i64,
    pub conversation_id: i64,
    #[serde(default)]
    pub message_content: String,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis_id: AnalysisId,
    pub analysis: EmotionClassification,
}

#[tracing::instrument(skip(state, payload))]
pub async fn analyze_message_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(request) = payload?;

    let outcome = state
        .classification_service
        .classify(ClassificationRequest {
            message_id: MessageId::from_i64(request.message_id),
            conversation_id: ConversationId::from_i64(request.conversation_id),
            message_content: request.message_content,
        })
        .await?;

    Ok(Json(AnalyzeResponse {
        success: true,
        analysis_id: outcome.analysis_id,
        analysis: outcome.classification,
    }))
}

use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::services::{
    Dashboard, EmotionReport, FlaggedConversationPage, UserDetail, UserPage, analysis_filter,
};
use crate::domain::{
    AnonymousUserId, ConversationId, EmotionClassification, FlaggedMessage, MessageId,
    MessageRole, ReportPeriod, ThreadId,
};
use crate::presentation::state::AppState;

use super::ApiError;

#[derive(Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Deserialize)]
pub struct FlaggedConversationsQuery {
    pub sentiment: Option<String>,
    pub min_urgency: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct FlaggedMessagesQuery {
    pub sentiment: Option<String>,
    pub min_urgency: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct UsersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct EmotionReportResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: EmotionReport,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    #[serde(flatten)]
    pub dashboard: Dashboard,
}

#[derive(Serialize)]
pub struct FlaggedConversationsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: FlaggedConversationPage,
}

#[derive(Serialize)]
pub struct FlaggedMessagesResponse {
    pub success: bool,
    pub messages: Vec<FlaggedMessage>,
}

#[derive(Serialize)]
pub struct UsersResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: UserPage,
}

#[derive(Serialize)]
pub struct UserDetailResponse {
    pub success: bool,
    #[serde(flatten)]
    pub detail: UserDetail,
}

#[derive(Serialize)]
pub struct AdminDeleteResponse {
    pub success: bool,
    pub conversation_id: ConversationId,
}

#[derive(Serialize)]
pub struct ConversationView {
    pub id: ConversationId,
    pub anonymous_user_id: AnonymousUserId,
    pub title: String,
    pub thread_id: Option<ThreadId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ReviewedMessageView {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub analysis: Option<EmotionClassification>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ConversationDetailResponse {
    pub success: bool,
    pub conversation: ConversationView,
    pub messages: Vec<ReviewedMessageView>,
}

#[tracing::instrument(skip(state, query))]
pub async fn emotion_report_handler(
    State(state): State<AppState>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Json<EmotionReportResponse>, ApiError> {
    let Query(query) = query?;
    let period = match query.period.as_deref().map(str::trim) {
        None | Some("") => ReportPeriod::default(),
        Some(raw) => ReportPeriod::parse(raw).map_err(ApiError::bad_request)?,
    };

    let report = state.reporting_service.emotion_report(period).await?;
    Ok(Json(EmotionReportResponse {
        success: true,
        report,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn dashboard_handler(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let dashboard = state.reporting_service.dashboard().await?;
    Ok(Json(DashboardResponse {
        success: true,
        dashboard,
    }))
}

#[tracing::instrument(skip(state, query))]
pub async fn flagged_conversations_handler(
    State(state): State<AppState>,
    query: Result<Query<FlaggedConversationsQuery>, QueryRejection>,
) -> Result<Json<FlaggedConversationsResponse>, ApiError> {
    let Query(query) = query?;
    let filter = analysis_filter(query.sentiment.as_deref(), query.min_urgency.as_deref())?;

    let page = state
        .reporting_service
        .flagged_conversations(filter, query.page, query.limit)
        .await?;
    Ok(Json(FlaggedConversationsResponse {
        success: true,
        page,
    }))
}

#[tracing::instrument(skip(state, path))]
pub async fn conversation_detail_handler(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let Path(id) = path?;
    let detail = state
        .reporting_service
        .conversation_detail(ConversationId::from_i64(id))
        .await?;

    let conversation = detail.conversation;
    Ok(Json(ConversationDetailResponse {
        success: true,
        conversation: ConversationView {
            id: conversation.id,
            anonymous_user_id: conversation.anonymous_user_id,
            title: conversation.title,
            thread_id: conversation.thread_id,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        },
        messages: detail
            .messages
            .into_iter()
            .map(|reviewed| ReviewedMessageView {
                id: reviewed.message.id,
                role: reviewed.message.role,
                content: reviewed.message.content,
                created_at: reviewed.message.created_at,
                analysis: reviewed.analysis.as_ref().map(|a| a.classification),
                analyzed_at: reviewed.analysis.map(|a| a.analyzed_at),
            })
            .collect(),
    }))
}

#[tracing::instrument(skip(state, query))]
pub async fn flagged_messages_handler(
    State(state): State<AppState>,
    query: Result<Query<FlaggedMessagesQuery>, QueryRejection>,
) -> Result<Json<FlaggedMessagesResponse>, ApiError> {
    let Query(query) = query?;
    let filter = analysis_filter(query.sentiment.as_deref(), query.min_urgency.as_deref())?;

    let messages = state
        .reporting_service
        .flagged_messages(filter, query.limit)
        .await?;
    Ok(Json(FlaggedMessagesResponse {
        success: true,
        messages,
    }))
}

#[tracing::instrument(skip(state, path))]
pub async fn admin_delete_conversation_handler(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<AdminDeleteResponse>, ApiError> {
    let Path(id) = path?;
    let conversation_id = ConversationId::from_i64(id);
    state.conversation_service.remove(conversation_id).await?;

    Ok(Json(AdminDeleteResponse {
        success: true,
        conversation_id,
    }))
}

#[tracing::instrument(skip(state, query))]
pub async fn users_handler(
    State(state): State<AppState>,
    query: Result<Query<UsersQuery>, QueryRejection>,
) -> Result<Json<UsersResponse>, ApiError> {
    let Query(query) = query?;
    let page = state
        .reporting_service
        .users(query.page, query.limit)
        .await?;
    Ok(Json(UsersResponse {
        success: true,
        page,
    }))
}

#[tracing::instrument(skip(state, path))]
pub async fn user_detail_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let Path(user_id) = path?;
    let detail = state.reporting_service.user_detail(&user_id).await?;
    Ok(Json(UserDetailResponse {
        success: true,
        detail,
    }))
}

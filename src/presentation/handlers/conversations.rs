use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, MessageId, MessageRole, Pagination, ThreadId};
use crate::presentation::state::AppState;

use super::ApiError;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub user_id: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Serialize)]
pub struct ConversationItem {
    pub id: ConversationId,
    pub title: String,
    pub thread_id: Option<ThreadId>,
    pub preview: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ConversationListResponse {
    pub success: bool,
    pub conversations: Vec<ConversationItem>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct RenameResponse {
    pub success: bool,
    pub id: ConversationId,
    pub title: String,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct MessageItem {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub conversation_id: ConversationId,
    pub title: String,
    pub messages: Vec<MessageItem>,
}

#[tracing::instrument(skip(state, query))]
pub async fn list_conversations_handler(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let Query(query) = query?;
    let page = state
        .conversation_service
        .list(&query.user_id, query.page, query.limit)
        .await?;

    let conversations = page
        .conversations
        .into_iter()
        .map(|item| ConversationItem {
            id: item.summary.id,
            title: item.summary.title,
            thread_id: item.summary.thread_id,
            preview: item.preview,
            message_count: item.summary.message_count,
            created_at: item.summary.created_at,
            updated_at: item.summary.updated_at,
        })
        .collect();

    Ok(Json(ConversationListResponse {
        success: true,
        conversations,
        pagination: page.pagination,
    }))
}

#[tracing::instrument(skip(state, path, payload))]
pub async fn rename_conversation_handler(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<RenameResponse>, ApiError> {
    let Path(id) = path?;
    let Json(request) = payload?;
    let conversation = state
        .conversation_service
        .rename(
            &request.user_id,
            ConversationId::from_i64(id),
            &request.title,
        )
        .await?;

    Ok(Json(RenameResponse {
        success: true,
        id: conversation.id,
        title: conversation.title,
    }))
}

#[tracing::instrument(skip(state, path, query))]
pub async fn delete_conversation_handler(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    state
        .conversation_service
        .delete(&query.user_id, ConversationId::from_i64(id))
        .await?;

    Ok(Json(DeleteResponse { success: true }))
}

#[tracing::instrument(skip(state, path, query))]
pub async fn conversation_messages_handler(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<OwnerQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let (conversation, messages) = state
        .conversation_service
        .history(&query.user_id, ConversationId::from_i64(id))
        .await?;

    Ok(Json(HistoryResponse {
        success: true,
        conversation_id: conversation.id,
        title: conversation.title,
        messages: messages
            .into_iter()
            .map(|m| MessageItem {
                id: m.id,
                role: m.role,
                content: m.content,
                created_at: m.created_at,
            })
            .collect(),
    }))
}

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::services::{
    ChatTurnError, ClassificationError, ConversationServiceError, ErrorKind, ReportingError,
};
use crate::domain::ConversationId;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// Error returned by every handler, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub conversation_id: Option<ConversationId>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: status_for(kind),
            message: message.into(),
            conversation_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Upstream | ErrorKind::UpstreamFormat | ErrorKind::Storage => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                conversation_id: self.conversation_id,
            }),
        )
            .into_response()
    }
}

impl From<ChatTurnError> for ApiError {
    fn from(e: ChatTurnError) -> Self {
        let mut api_error = ApiError::new(e.kind(), e.to_string());
        if let ChatTurnError::Timeout {
            conversation_id, ..
        } = e
        {
            api_error.message = "The assistant took too long to answer, please retry".to_string();
            api_error.conversation_id = Some(conversation_id);
        }
        api_error
    }
}

impl From<ClassificationError> for ApiError {
    fn from(e: ClassificationError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<ConversationServiceError> for ApiError {
    fn from(e: ConversationServiceError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<ReportingError> for ApiError {
    fn from(e: ReportingError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

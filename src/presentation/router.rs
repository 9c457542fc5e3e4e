use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::infrastructure::observability::request_id_middleware;
use crate::presentation::handlers::{
    admin_delete_conversation_handler, analyze_message_handler, chat_handler,
    conversation_detail_handler, conversation_messages_handler, dashboard_handler,
    delete_conversation_handler, emotion_report_handler, flagged_conversations_handler,
    flagged_messages_handler, health_handler, list_conversations_handler,
    rename_conversation_handler, user_detail_handler, users_handler,
};
use crate::presentation::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/conversations", get(list_conversations_handler))
        .route(
            "/api/conversations/{id}",
            put(rename_conversation_handler).delete(delete_conversation_handler),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversation_messages_handler),
        )
        .route("/api/emotions/analyze", post(analyze_message_handler))
        .nest("/api/admin", admin_router())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

/// Back-office routes. Authentication is expected to be layered on this router.
fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/emotions", get(emotion_report_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/conversations", get(flagged_conversations_handler))
        .route(
            "/conversations/{id}",
            get(conversation_detail_handler).delete(admin_delete_conversation_handler),
        )
        .route("/messages", get(flagged_messages_handler))
        .route("/users", get(users_handler))
        .route("/users/{user_id}", get(user_detail_handler))
}

mod admin;
mod chat;
mod conversations;
mod emotions;
mod error;
mod health;

pub use admin::{
    admin_delete_conversation_handler, conversation_detail_handler, dashboard_handler,
    emotion_report_handler, flagged_conversations_handler, flagged_messages_handler,
    user_detail_handler, users_handler,
};
pub use chat::chat_handler;
pub use conversations::{
    conversation_messages_handler, delete_conversation_handler, list_conversations_handler,
    rename_conversation_handler,
};
pub use emotions::analyze_message_handler;
pub use error::{ApiError, ErrorResponse, status_for};
pub use health::health_handler;

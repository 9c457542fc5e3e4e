use chrono::{DateTime, Utc};

use super::{ConversationId, MessageId, MessageRole};

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};

use super::{AnonymousUserId, ConversationId, ThreadId};

pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub anonymous_user_id: AnonymousUserId,
    pub title: String,
    pub thread_id: Option<ThreadId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_owned_by(&self, user_id: &AnonymousUserId) -> bool {
        self.anonymous_user_id == *user_id
    }

    /// Default title for a conversation opened by `first_message`.
    pub fn title_from_message(first_message: &str, max_chars: usize) -> String {
        truncate_chars(first_message.trim(), max_chars.min(MAX_TITLE_CHARS)).to_string()
    }
}

/// Outcome of binding an external thread to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadBinding {
    Bound,
    AlreadyBound,
}

/// Listing row for a user's conversation history.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub thread_id: Option<ThreadId>,
    pub first_message: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn preview(&self, max_chars: usize) -> Option<String> {
        self.first_message.as_deref().map(|content| {
            let prefix = truncate_chars(content, max_chars);
            if prefix.len() < content.len() {
                format!("{}...", prefix)
            } else {
                prefix.to_string()
            }
        })
    }
}

/// Returns the longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

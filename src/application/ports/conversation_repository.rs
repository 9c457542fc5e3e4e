use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ActivityTotals, AnonymousUserId, Conversation, ConversationId, ConversationSummary,
    DailyActivity, Message, MessageId, MessageRole, PageRequest, ThreadBinding, ThreadId,
    UserActivity,
};

use super::RepositoryError;

/// Sole writer of conversations and messages.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create_conversation(
        &self,
        user_id: &AnonymousUserId,
        title: &str,
    ) -> Result<Conversation, RepositoryError>;

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Binds `thread_id` once. Re-binding the same value is a no-op; binding a
    /// different value fails with `ConstraintViolation`.
    async fn bind_thread(
        &self,
        id: ConversationId,
        thread_id: &ThreadId,
    ) -> Result<ThreadBinding, RepositoryError>;

    /// Inserts a message and refreshes the conversation's `updated_at` atomically.
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, RepositoryError>;

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// All messages of a conversation in chronological order.
    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), RepositoryError>;

    /// Removes the conversation, its messages and their analyses in one unit.
    async fn delete_conversation(&self, id: ConversationId) -> Result<(), RepositoryError>;

    /// Conversations of one user, most recently active first.
    async fn list_by_user(
        &self,
        user_id: &AnonymousUserId,
        page: PageRequest,
    ) -> Result<Vec<ConversationSummary>, RepositoryError>;

    async fn count_by_user(&self, user_id: &AnonymousUserId) -> Result<u64, RepositoryError>;

    /// Activity counters, restricted to rows created at or after `since` when given.
    async fn activity_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ActivityTotals, RepositoryError>;

    /// Number of distinct users owning at least one conversation.
    async fn count_users(&self) -> Result<u64, RepositoryError>;

    /// Message and conversation counters of one user, `None` when the user
    /// owns no conversation.
    async fn user_activity(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<Option<UserActivity>, RepositoryError>;

    async fn daily_activity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyActivity>, RepositoryError>;
}

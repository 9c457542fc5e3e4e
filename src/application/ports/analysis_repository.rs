use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AnalysisField, AnalysisFilter, AnalysisSummary, AnonymousUserId, ConversationId, DailyCount,
    EmotionAnalysis, FlaggedConversation, FlaggedMessage, Message, MessageId,
    NewEmotionAnalysis, PageRequest, UrgencyStats, UserOverview, ValueCount,
};

use super::RepositoryError;

/// Sole writer of emotion analyses and the read side used by reporting.
///
/// Every read tolerates an empty table and returns empty collections or zero
/// counts.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Fails with `ConstraintViolation` when the message already has an analysis.
    async fn insert_analysis(
        &self,
        analysis: &NewEmotionAnalysis,
    ) -> Result<EmotionAnalysis, RepositoryError>;

    async fn find_by_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<EmotionAnalysis>, RepositoryError>;

    async fn list_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<EmotionAnalysis>, RepositoryError>;

    async fn distribution(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ValueCount>, RepositoryError>;

    async fn top_values(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ValueCount>, RepositoryError>;

    /// Per-day counts of each value of `field` from `since` onwards, oldest first.
    async fn daily_counts(
        &self,
        field: AnalysisField,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyCount>, RepositoryError>;

    async fn summary(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<AnalysisSummary, RepositoryError>;

    /// Conversations whose most recent analysis matches `filter`, most recently
    /// active first. An empty filter also returns conversations never analysed.
    async fn flagged_conversations(
        &self,
        filter: &AnalysisFilter,
        page: PageRequest,
    ) -> Result<Vec<FlaggedConversation>, RepositoryError>;

    async fn count_flagged_conversations(
        &self,
        filter: &AnalysisFilter,
    ) -> Result<u64, RepositoryError>;

    /// Analysed messages matching `filter`, highest urgency first.
    async fn flagged_messages(
        &self,
        filter: &AnalysisFilter,
        limit: usize,
    ) -> Result<Vec<FlaggedMessage>, RepositoryError>;

    /// Users with at least one conversation, most recently active first.
    async fn list_users(&self, page: PageRequest) -> Result<Vec<UserOverview>, RepositoryError>;

    /// Every conversation of one user with its latest analysis, most recently
    /// active first.
    async fn user_conversations(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<Vec<FlaggedConversation>, RepositoryError>;

    async fn user_distribution(
        &self,
        field: AnalysisField,
        user_id: &AnonymousUserId,
    ) -> Result<Vec<ValueCount>, RepositoryError>;

    async fn user_urgency_stats(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<UrgencyStats, RepositoryError>;

    /// User messages that have no analysis yet, oldest first.
    async fn unanalyzed_user_messages(&self, limit: usize)
    -> Result<Vec<Message>, RepositoryError>;
}
